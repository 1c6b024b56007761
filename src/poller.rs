// Detects crop changes made outside the panel (OBS UI, other clients) by polling.
// Polling pauses while the panel's own animation runs so its writes never read back as external edits.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future::{AbortHandle, Abortable, FutureExt, LocalBoxFuture};

use crate::crop_filter::{CropAccessor, CROP_FILTER_TYPE};
use crate::error::CamError;
use crate::schedule::{ProgressFlag, Sleeper};
use crate::types::CropRect;

/// Default polling period.
pub const POLL_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
enum PollState {
    Idle,
    Watching {
        source: String,
        filter: String,
        last_known: CropRect,
    },
}

/// A running watch: the change stream and the loop driving it.
/// The caller spawns `task` on its executor; [`ChangePoller::stop`] ends it.
pub struct PollSubscription {
    pub changes: UnboundedReceiver<CropRect>,
    pub task: LocalBoxFuture<'static, ()>,
}

/// Polls one source's crop filter and reports differing rectangles.
#[derive(Clone)]
pub struct ChangePoller {
    accessor: CropAccessor,
    sleeper: Rc<dyn Sleeper>,
    progress: ProgressFlag,
    period: Duration,
    state: Rc<RefCell<PollState>>,
    abort: Rc<RefCell<Option<AbortHandle>>>,
}

impl ChangePoller {
    pub fn new(accessor: CropAccessor, sleeper: Rc<dyn Sleeper>, progress: ProgressFlag) -> Self {
        ChangePoller {
            accessor,
            sleeper,
            progress,
            period: POLL_PERIOD,
            state: Rc::new(RefCell::new(PollState::Idle)),
            abort: Rc::new(RefCell::new(None)),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn is_watching(&self) -> bool {
        matches!(*self.state.borrow(), PollState::Watching { .. })
    }

    /// Last rectangle observed on the watched source.
    pub fn last_known(&self) -> Option<CropRect> {
        match &*self.state.borrow() {
            PollState::Watching { last_known, .. } => Some(*last_known),
            PollState::Idle => None,
        }
    }

    /// Resolve the crop filter once, remember the current rectangle and arm the poll loop.
    /// A previous watch is stopped first.
    pub async fn start(&self, source: &str) -> Result<PollSubscription, CamError> {
        let filter = self.accessor.resolve_filter(source, CROP_FILTER_TYPE).await?;
        let last_known = self.accessor.get_crop(source, Some(&filter)).await?;

        self.stop();
        *self.state.borrow_mut() = PollState::Watching {
            source: source.to_string(),
            filter,
            last_known,
        };
        log::debug!("watching crop of \"{}\" starting at {:?}", source, last_known);

        let (tx, rx) = mpsc::unbounded();
        let (handle, registration) = AbortHandle::new_pair();
        *self.abort.borrow_mut() = Some(handle);

        let poller = self.clone();
        let task = Abortable::new(async move { poller.run(tx).await }, registration)
            .map(|_| ())
            .boxed_local();

        Ok(PollSubscription { changes: rx, task })
    }

    /// Cancel the loop and forget the watch. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(handle) = self.abort.borrow_mut().take() {
            handle.abort();
        }
        *self.state.borrow_mut() = PollState::Idle;
    }

    async fn run(&self, tx: UnboundedSender<CropRect>) {
        loop {
            self.sleeper.sleep(self.period).await;
            if !self.is_watching() {
                break;
            }
            match self.tick().await {
                Ok(Some(rect)) => {
                    if tx.unbounded_send(rect).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("polling crop failed: {}", e),
            }
        }
    }

    /// One poll. Skipped entirely (no request) while an animation holds the progress token.
    pub async fn tick(&self) -> Result<Option<CropRect>, CamError> {
        if self.progress.is_held() {
            return Ok(None);
        }
        let (source, filter, last_known) = match &*self.state.borrow() {
            PollState::Watching {
                source,
                filter,
                last_known,
            } => (source.clone(), filter.clone(), *last_known),
            PollState::Idle => return Ok(None),
        };

        let rect = self.accessor.get_crop(&source, Some(&filter)).await?;
        // An animation may have started while the request was out.
        if rect == last_known || self.progress.is_held() {
            return Ok(None);
        }

        if let PollState::Watching { last_known, .. } = &mut *self.state.borrow_mut() {
            *last_known = rect;
        }
        log::debug!("crop of \"{}\" changed externally to {:?}", source, rect);
        Ok(Some(rect))
    }
}
