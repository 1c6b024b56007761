// cam_control: OBS Studio camera control panel, Rust/WASM core
// Crop animation, external-change polling and PTZ recall live here; the page only renders PanelView JSON
// and forwards pointer input and OBS events.

mod animation;
mod config;
mod crop_filter;
mod crop_state;
mod error;
mod gesture;
mod obs;
mod panel;
mod poller;
mod ptz;
mod schedule;
mod types;

#[cfg(target_arch = "wasm32")]
mod browser;

#[cfg(test)]
mod test_support;

use wasm_bindgen::prelude::*;

pub use animation::{ease_cubic_in_out, AnimationSession, CropAnimator, TransitionOutcome, MAX_FPS};
pub use config::{PanelConfig, PreviewConfig};
pub use crop_filter::{CropAccessor, CROP_FILTER_TYPE};
pub use crop_state::CropState;
pub use error::CamError;
pub use gesture::{CropGesture, DisplayBounds, Gesture, MIN_DISPLAY_HEIGHT};
pub use obs::{FilterEntry, ObsClient, ObsEvent, ObsRequests, ObsVersion, ACTIVATE_CAMERA_REALM};
pub use panel::{ActivationTarget, Panel, PanelView, PreviewView};
pub use poller::{ChangePoller, PollSubscription, POLL_PERIOD};
pub use ptz::{PtzTransport, RecallOutcome, RecallRequest, RecallSequencer, SETTLE_DELAY};
pub use schedule::{ProgressFlag, ProgressToken, Sleeper};
pub use types::*;

#[cfg(target_arch = "wasm32")]
pub use browser::{BrowserSleeper, CamControl, HttpPtzTransport, JsObsRequests, ObsWebSocket};

/// Install the panic hook and the console logger.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(target_arch = "wasm32")]
    console_log::init_with_level(log::Level::Info).ok();
}

/// Validate a page query without connecting. Returns the parsed configuration as JSON.
#[wasm_bindgen]
pub fn parse_config(query: &str) -> Result<String, JsValue> {
    let config = PanelConfig::from_query(query).map_err(|e| JsValue::from_str(&e.to_string()))?;
    serde_json::to_string(&config).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}
