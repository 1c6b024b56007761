// Browser side: JS-backed transports and the object the page talks to.
// JS is plumbing; everything it passes in or gets back is JSON text or plain numbers.

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{abortable, AbortHandle};
use futures::StreamExt;
use js_sys::{Promise, Reflect, JSON};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local, JsFuture};

use crate::config::PanelConfig;
use crate::error::CamError;
use crate::obs::{ObsEvent, ObsRequests};
use crate::panel::{ActivationTarget, Panel, SOURCE_ACTIVE_PERIOD};
use crate::ptz::{PtzTransport, RecallRequest};
use crate::schedule::Sleeper;

#[wasm_bindgen]
extern "C" {
    /// The page's connected `OBSWebSocket` (obs-websocket-js 4.x).
    pub type ObsWebSocket;

    #[wasm_bindgen(method, catch)]
    fn send(this: &ObsWebSocket, request: &str, args: JsValue) -> Result<Promise, JsValue>;
}

fn js_error_message(error: &JsValue) -> String {
    if let Some(text) = error.as_string() {
        return text;
    }
    for key in ["error", "message"] {
        if let Some(text) = Reflect::get(error, &JsValue::from_str(key))
            .ok()
            .and_then(|v| v.as_string())
        {
            return text;
        }
    }
    format!("{:?}", error)
}

/// OBS requests over the page's websocket object.
pub struct JsObsRequests {
    socket: ObsWebSocket,
}

impl JsObsRequests {
    pub fn new(socket: ObsWebSocket) -> Self {
        JsObsRequests { socket }
    }
}

#[async_trait(?Send)]
impl ObsRequests for JsObsRequests {
    async fn call(&self, request: &str, args: Value) -> Result<Value, CamError> {
        let args = JSON::parse(&serde_json::to_string(&args)?)
            .map_err(|e| CamError::Serialization(js_error_message(&e)))?;
        let promise = self
            .socket
            .send(request, args)
            .map_err(|e| CamError::remote(request, js_error_message(&e)))?;
        let response = JsFuture::from(promise)
            .await
            .map_err(|e| CamError::remote(request, js_error_message(&e)))?;
        if response.is_undefined() || response.is_null() {
            return Ok(Value::Null);
        }
        let text = JSON::stringify(&response)
            .map_err(|e| CamError::Serialization(js_error_message(&e)))?;
        match JsValue::from(text).as_string() {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Value::Null),
        }
    }
}

/// `setTimeout`-backed timer.
pub struct BrowserSleeper;

#[async_trait(?Send)]
impl Sleeper for BrowserSleeper {
    async fn sleep(&self, period: Duration) {
        gloo_timers::future::sleep(period).await;
    }
}

/// PTZ recalls over `fetch`.
pub struct HttpPtzTransport;

#[async_trait(?Send)]
impl PtzTransport for HttpPtzTransport {
    async fn post_recall(&self, url: &str, request: &RecallRequest) -> Result<(), CamError> {
        gloo_net::http::Request::post(url)
            .json(request)
            .map_err(|e| CamError::Transport(e.to_string()))?
            .send()
            .await
            .map_err(|e| CamError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn to_js(error: CamError) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn promise<F>(future: F) -> Promise
where
    F: Future<Output = Result<JsValue, CamError>> + 'static,
{
    future_to_promise(async move { future.await.map_err(to_js) })
}

/// Run `task` on the browser event loop until the handle is aborted.
fn spawn_abortable<F>(task: F) -> AbortHandle
where
    F: Future<Output = ()> + 'static,
{
    let (task, handle) = abortable(task);
    spawn_local(async move {
        let _ = task.await;
    });
    handle
}

// ============================================================================
// WASM Bindings
// ============================================================================

/// Control panel for one camera, exposed to JavaScript.
#[wasm_bindgen]
pub struct CamControl {
    panel: Rc<Panel>,
    background: Vec<AbortHandle>,
}

#[wasm_bindgen]
impl CamControl {
    /// Parse the page query, read the initial state from OBS Studio and start
    /// the background watchers.
    pub async fn connect(query: String, viewport_width: f64, obs: ObsWebSocket) -> Result<CamControl, JsValue> {
        let config = PanelConfig::from_query(&query).map_err(to_js)?;
        if config.debug {
            log::set_max_level(log::LevelFilter::Debug);
        }

        let panel = Panel::connect(
            config,
            viewport_width,
            Rc::new(JsObsRequests::new(obs)),
            Rc::new(HttpPtzTransport),
            Rc::new(BrowserSleeper),
        )
        .await
        .map_err(to_js)?;
        let panel = Rc::new(panel);
        let mut background = Vec::new();

        let subscription = panel.start_watching().await.map_err(to_js)?;
        background.push(spawn_abortable(subscription.task));
        let watcher = panel.clone();
        let mut changes = subscription.changes;
        background.push(spawn_abortable(async move {
            while let Some(rect) = changes.next().await {
                watcher.apply_external_change(rect);
            }
        }));

        let activity = panel.clone();
        background.push(spawn_abortable(async move {
            loop {
                gloo_timers::future::sleep(SOURCE_ACTIVE_PERIOD).await;
                activity.refresh_source_active().await;
            }
        }));

        if let Some(period) = panel.preview_period() {
            let preview = panel.clone();
            background.push(spawn_abortable(async move {
                loop {
                    gloo_timers::future::sleep(period).await;
                    if let Err(e) = preview.capture_preview().await {
                        log::warn!("preview screenshot failed: {}", e);
                    }
                }
            }));
        }

        Ok(CamControl { panel, background })
    }

    /// Current panel state as JSON.
    pub fn view_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.panel.view())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn set_preset(&self, digit: u8) -> Promise {
        let panel = self.panel.clone();
        promise(async move {
            panel.set_preset(digit).await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn set_speed(&self, index: usize) -> Result<(), JsValue> {
        self.panel.set_speed(index).map_err(to_js)
    }

    /// Pointer coordinates are relative to the canvas element.
    pub fn press(&self, x: f64, y: f64) -> bool {
        self.panel.press(x, y)
    }

    #[wasm_bindgen(js_name = "move")]
    pub fn pointer_move(&self, x: f64, y: f64) {
        self.panel.pointer_move(x, y);
    }

    pub fn wheel(&self, delta: f64) {
        self.panel.wheel(delta);
    }

    /// Resolves to `true` when the drag started a transition.
    pub fn release(&self) -> Promise {
        let panel = self.panel.clone();
        promise(async move {
            let outcome = panel.release().await?;
            Ok(JsValue::from_bool(outcome.is_some()))
        })
    }

    pub fn cancel(&self) {
        self.panel.cancel();
    }

    /// `target` is one of `camera`, `virtual` or `physical`.
    pub fn activate(&self, target: &str) -> Promise {
        let panel = self.panel.clone();
        let target = target.parse::<ActivationTarget>();
        promise(async move {
            panel.activate(target?).await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Feed an OBS event by update-type name and JSON payload.
    pub fn handle_event(&self, name: &str, payload: &str) -> Promise {
        let panel = self.panel.clone();
        let event = ObsEvent::parse(name, payload);
        promise(async move {
            panel.handle_event(event?).await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn toggle_preview(&self) -> bool {
        self.panel.toggle_preview()
    }

    /// Stop polling and every background task.
    pub fn close(&mut self) {
        self.panel.stop_watching();
        for handle in self.background.drain(..) {
            handle.abort();
        }
    }
}
