// Cooperative scheduling primitives: an injectable timer and the animation progress token.
// Everything runs on one thread, so plain Cell state is enough; check-and-act never straddles an await.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;

/// Timer seam. The browser build sleeps on `setTimeout`; tests resolve immediately.
#[async_trait(?Send)]
pub trait Sleeper {
    async fn sleep(&self, period: Duration);
}

/// Shared "an animation is in progress" flag.
///
/// The animation engine holds a [`ProgressToken`] for the whole run; the change
/// poller skips its tick while the flag is set. Dropping the token releases it,
/// including when a run is aborted by an error.
#[derive(Debug, Clone, Default)]
pub struct ProgressFlag {
    held: Rc<Cell<bool>>,
}

impl ProgressFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.get()
    }

    /// Take the token, or `None` when a run is already in progress.
    pub fn try_acquire(&self) -> Option<ProgressToken> {
        if self.held.replace(true) {
            return None;
        }
        Some(ProgressToken {
            held: Rc::clone(&self.held),
        })
    }
}

/// Proof of an exclusive animation run.
#[derive(Debug)]
pub struct ProgressToken {
    held: Rc<Cell<bool>>,
}

impl Drop for ProgressToken {
    fn drop(&mut self) {
        self.held.set(false);
    }
}
