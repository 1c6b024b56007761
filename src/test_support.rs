// In-memory stand-ins for OBS Studio, the PTZ camera and timers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::oneshot;
use serde_json::{json, Map, Value};

use crate::error::CamError;
use crate::obs::ObsRequests;
use crate::ptz::{PtzTransport, RecallRequest};
use crate::schedule::Sleeper;
use crate::types::CropRect;

struct FakeSource {
    filters: Vec<Value>,
    settings: Map<String, Value>,
    active: bool,
}

/// Fake OBS Studio holding crop filter settings per source.
#[derive(Default)]
pub struct FakeObs {
    sources: RefCell<HashMap<String, FakeSource>>,
    calls: RefCell<Vec<(String, Value)>>,
    // request name -> successful calls left before failing
    failures: RefCell<HashMap<String, usize>>,
    studio_mode: Cell<bool>,
}

impl FakeObs {
    pub fn new() -> Rc<FakeObs> {
        Rc::new(FakeObs::default())
    }

    /// Source with a color filter followed by a crop filter named "Crop".
    pub fn add_source(&self, name: &str, x: i32, y: i32, w: i32, h: i32) {
        let settings = json!({ "left": x, "top": y, "cx": w, "cy": h, "relative": false });
        self.sources.borrow_mut().insert(
            name.to_string(),
            FakeSource {
                filters: vec![
                    json!({ "name": "Color", "type": "color_filter", "enabled": true }),
                    json!({ "name": "Crop", "type": "crop_filter", "enabled": true }),
                ],
                settings: settings.as_object().cloned().unwrap_or_default(),
                active: false,
            },
        );
    }

    pub fn add_source_without_crop(&self, name: &str) {
        self.sources.borrow_mut().insert(
            name.to_string(),
            FakeSource {
                filters: vec![json!({ "name": "Color", "type": "color_filter" })],
                settings: Map::new(),
                active: false,
            },
        );
    }

    /// Change a crop behind the panel's back.
    pub fn set_crop_remote(&self, name: &str, rect: CropRect) {
        if let Some(source) = self.sources.borrow_mut().get_mut(name) {
            source.settings.insert("left".into(), json!(rect.x));
            source.settings.insert("top".into(), json!(rect.y));
            source.settings.insert("cx".into(), json!(rect.w));
            source.settings.insert("cy".into(), json!(rect.h));
        }
    }

    pub fn set_active(&self, name: &str, active: bool) {
        if let Some(source) = self.sources.borrow_mut().get_mut(name) {
            source.active = active;
        }
    }

    pub fn set_studio_mode(&self, on: bool) {
        self.studio_mode.set(on);
    }

    pub fn settings_of(&self, name: &str) -> Map<String, Value> {
        self.sources.borrow()[name].settings.clone()
    }

    pub fn crop_of(&self, name: &str) -> CropRect {
        let settings = self.settings_of(name);
        let field = |k: &str| settings[k].as_i64().unwrap() as i32;
        CropRect::new(field("left"), field("top"), field("cx"), field("cy"))
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.calls.borrow().iter().filter(|(r, _)| r == request).count()
    }

    /// Crops written to `source`, in order.
    pub fn writes_to(&self, source: &str) -> Vec<CropRect> {
        self.calls
            .borrow()
            .iter()
            .filter(|(r, args)| r == "SetSourceFilterSettings" && args["sourceName"] == source)
            .map(|(_, args)| {
                let s = &args["filterSettings"];
                let field = |k: &str| s[k].as_i64().unwrap() as i32;
                CropRect::new(field("left"), field("top"), field("cx"), field("cy"))
            })
            .collect()
    }

    /// Let `successes` more `request` calls through, then fail every one after.
    pub fn fail_after(&self, request: &str, successes: usize) {
        self.failures.borrow_mut().insert(request.to_string(), successes);
    }

    fn should_fail(&self, request: &str) -> bool {
        let mut failures = self.failures.borrow_mut();
        match failures.get_mut(request) {
            Some(0) => true,
            Some(left) => {
                *left -= 1;
                false
            }
            None => false,
        }
    }

    fn source_arg(&self, args: &Value, request: &str) -> Result<String, CamError> {
        let name = args["sourceName"].as_str().unwrap_or_default().to_string();
        if self.sources.borrow().contains_key(&name) {
            Ok(name)
        } else {
            Err(CamError::remote(request, "specified source doesn't exist"))
        }
    }
}

#[async_trait(?Send)]
impl ObsRequests for FakeObs {
    async fn call(&self, request: &str, args: Value) -> Result<Value, CamError> {
        self.calls.borrow_mut().push((request.to_string(), args.clone()));
        if self.should_fail(request) {
            return Err(CamError::remote(request, "injected failure"));
        }
        match request {
            "GetVersion" => Ok(json!({ "obsStudioVersion": "27.2.4", "obsWebsocketVersion": "4.9.1" })),
            "GetSourceFilters" => {
                let name = self.source_arg(&args, request)?;
                Ok(json!({ "filters": self.sources.borrow()[&name].filters }))
            }
            "GetSourceFilterInfo" => {
                let name = self.source_arg(&args, request)?;
                Ok(json!({
                    "name": args["filterName"],
                    "type": "crop_filter",
                    "settings": self.sources.borrow()[&name].settings,
                }))
            }
            "SetSourceFilterSettings" => {
                let name = self.source_arg(&args, request)?;
                let settings = args["filterSettings"].as_object().cloned().unwrap_or_default();
                if let Some(source) = self.sources.borrow_mut().get_mut(&name) {
                    source.settings = settings;
                }
                Ok(json!({}))
            }
            "GetSourceActive" => {
                let name = self.source_arg(&args, request)?;
                Ok(json!({ "sourceActive": self.sources.borrow()[&name].active }))
            }
            "GetStudioModeStatus" => Ok(json!({ "studioMode": self.studio_mode.get() })),
            "GetCurrentScene" => Ok(json!({ "name": "Program", "sources": [] })),
            "GetPreviewScene" => Ok(json!({ "name": "Preview", "sources": [] })),
            "TakeSourceScreenshot" => Ok(json!({ "sourceName": args["sourceName"], "img": "data:image/jpeg;base64,AAAA" })),
            _ => Ok(json!({})),
        }
    }
}

/// Future that is pending exactly once, handing control to sibling futures.
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Records requested sleeps. With `yielding`, each sleep suspends once so
/// concurrent futures in the same `join!` get to run.
#[derive(Default)]
pub struct FakeSleeper {
    slept: RefCell<Vec<Duration>>,
    yielding: bool,
}

impl FakeSleeper {
    pub fn instant() -> Rc<FakeSleeper> {
        Rc::new(FakeSleeper::default())
    }

    pub fn yielding() -> Rc<FakeSleeper> {
        Rc::new(FakeSleeper {
            slept: RefCell::default(),
            yielding: true,
        })
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Sleeper for FakeSleeper {
    async fn sleep(&self, period: Duration) {
        self.slept.borrow_mut().push(period);
        if self.yielding {
            YieldNow { yielded: false }.await;
        }
    }
}

/// PTZ endpoint recording every recall body; the first call can be held on a gate.
#[derive(Default)]
pub struct FakePtz {
    sent: RefCell<Vec<String>>,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
    failing: bool,
}

impl FakePtz {
    pub fn new() -> Rc<FakePtz> {
        Rc::new(FakePtz::default())
    }

    pub fn failing() -> Rc<FakePtz> {
        Rc::new(FakePtz {
            failing: true,
            ..FakePtz::default()
        })
    }

    /// Hold the next call until the returned sender fires.
    pub fn gated() -> (Rc<FakePtz>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let ptz = FakePtz {
            gate: RefCell::new(Some(rx)),
            ..FakePtz::default()
        };
        (Rc::new(ptz), tx)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }
}

#[async_trait(?Send)]
impl PtzTransport for FakePtz {
    async fn post_recall(&self, url: &str, request: &RecallRequest) -> Result<(), CamError> {
        assert!(url.ends_with(":8080/recall"));
        self.sent.borrow_mut().push(request.preset.clone());
        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.failing {
            return Err(CamError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}
