// PTZ preset recall with one-deep, last-writer-wins queueing.
// The camera handles one recall at a time; intermediate requests are dropped on purpose.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CamError;
use crate::schedule::Sleeper;

/// Time the camera head needs to finish moving after a recall.
pub const SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Body of `POST /recall`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallRequest {
    #[serde(rename = "Preset")]
    pub preset: String,
}

impl RecallRequest {
    pub fn for_preset(preset: u8) -> Self {
        RecallRequest {
            preset: format!("Preset-{}", preset),
        }
    }
}

/// HTTP seam to the camera. Only completion matters; the response body is ignored.
#[async_trait(?Send)]
pub trait PtzTransport {
    async fn post_recall(&self, url: &str, request: &RecallRequest) -> Result<(), CamError>;
}

/// Result of a [`RecallSequencer::recall`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallOutcome {
    /// Another recall was in flight; this one now occupies the pending slot.
    Queued,
    /// This call drove the queue and issued `issued` recalls before going idle.
    Drained { issued: usize },
}

#[derive(Debug, Default)]
struct RecallState {
    busy: bool,
    next: Option<u8>,
}

/// Serializes recalls to one camera.
#[derive(Clone)]
pub struct RecallSequencer {
    url: String,
    device: String,
    transport: Rc<dyn PtzTransport>,
    sleeper: Rc<dyn Sleeper>,
    settle: Duration,
    state: Rc<RefCell<RecallState>>,
}

impl RecallSequencer {
    pub fn new(device: &str, transport: Rc<dyn PtzTransport>, sleeper: Rc<dyn Sleeper>) -> Self {
        RecallSequencer {
            url: format!("http://{}:8080/recall", device),
            device: device.to_string(),
            transport,
            sleeper,
            settle: SETTLE_DELAY,
            state: Rc::new(RefCell::new(RecallState::default())),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().busy
    }

    pub fn pending(&self) -> Option<u8> {
        self.state.borrow().next
    }

    pub async fn recall(&self, preset: u8) -> RecallOutcome {
        {
            let mut state = self.state.borrow_mut();
            if state.busy {
                if state.next.is_some() {
                    log::info!(
                        "overriding the queueing for recalling PTZ preset #{} on camera {}",
                        preset,
                        self.device
                    );
                } else {
                    log::info!(
                        "queueing for recalling PTZ preset #{} on camera {}",
                        preset,
                        self.device
                    );
                }
                state.next = Some(preset);
                return RecallOutcome::Queued;
            }
            state.busy = true;
        }

        let mut preset = preset;
        let mut issued = 0;
        loop {
            log::info!("recalling PTZ preset #{} on camera {}", preset, self.device);
            let request = RecallRequest::for_preset(preset);
            if let Err(e) = self.transport.post_recall(&self.url, &request).await {
                log::warn!("PTZ recall of preset #{} failed: {}", preset, e);
            }
            issued += 1;
            self.sleeper.sleep(self.settle).await;

            let mut state = self.state.borrow_mut();
            match state.next.take() {
                Some(next) => preset = next,
                None => {
                    state.busy = false;
                    break;
                }
            }
        }

        RecallOutcome::Drained { issued }
    }
}
