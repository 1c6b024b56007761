// Crop transitions: fixed-duration, fixed-frame-rate eased interpolation pushed to OBS every frame.
// Rule: both endpoints are hit exactly; intermediate frames round per field.

use std::cell::RefCell;
use std::iter;
use std::rc::Rc;
use std::time::Duration;

use crate::crop_filter::CropAccessor;
use crate::crop_state::CropState;
use crate::error::CamError;
use crate::schedule::{ProgressFlag, Sleeper};
use crate::types::CropRect;

/// Highest accepted transition frame rate.
pub const MAX_FPS: u32 = 120;

/// Cubic ease-in-out: slow start, fast middle, slow end.
pub fn ease_cubic_in_out(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// One transition from `from` to `to`. Lives only while the engine runs it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSession {
    pub from: CropRect,
    pub to: CropRect,
    pub duration_ms: u32,
    pub fps: u32,
}

impl AnimationSession {
    pub fn new(from: CropRect, to: CropRect, duration_ms: u32, fps: u32) -> Self {
        AnimationSession {
            from,
            to,
            duration_ms,
            fps: fps.clamp(1, MAX_FPS),
        }
    }

    /// Wall-clock gap between two frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps))
    }

    /// Number of regular frames before the final one.
    /// `floor(duration / (1000 / fps))`, computed in integers.
    pub fn frame_count(&self) -> u32 {
        let count = u64::from(self.duration_ms) * u64::from(self.fps) / 1000;
        u32::try_from(count).unwrap_or(u32::MAX - 1)
    }

    /// Regular frames plus the final one.
    pub fn total_frames(&self) -> usize {
        self.frame_count() as usize + 1
    }

    /// Time parameters `i / frame_count` for every regular frame, then exactly `1.0`.
    /// Produced lazily; long transitions never materialize their whole plan.
    pub fn times(&self) -> impl Iterator<Item = f64> {
        let count = self.frame_count();
        (0..count)
            .map(move |i| f64::from(i) / f64::from(count))
            .chain(iter::once(1.0))
    }

    pub fn frame_at(&self, t: f64) -> CropRect {
        CropRect::interpolate(self.from, self.to, ease_cubic_in_out(t))
    }

    /// Every rectangle the transition passes through, in order.
    pub fn frames(&self) -> impl Iterator<Item = CropRect> + '_ {
        self.times().map(|t| self.frame_at(t))
    }
}

/// Result of [`CropAnimator::run_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Another transition was running; nothing happened.
    Rejected,
    Completed { frames: usize },
}

/// Drives transitions against OBS and the local crop state.
#[derive(Clone)]
pub struct CropAnimator {
    accessor: CropAccessor,
    sleeper: Rc<dyn Sleeper>,
    progress: ProgressFlag,
    crop: Rc<RefCell<CropState>>,
}

impl CropAnimator {
    pub fn new(
        accessor: CropAccessor,
        sleeper: Rc<dyn Sleeper>,
        progress: ProgressFlag,
        crop: Rc<RefCell<CropState>>,
    ) -> Self {
        CropAnimator {
            accessor,
            sleeper,
            progress,
            crop,
        }
    }

    pub fn is_running(&self) -> bool {
        self.progress.is_held()
    }

    /// Animate from `from` to `to`, writing each frame to every source in `linked`.
    ///
    /// Returns [`TransitionOutcome::Rejected`] without side effects when a
    /// transition is already running. A failed write aborts the remaining frames
    /// and releases the progress token.
    pub async fn run_transition(
        &self,
        from: CropRect,
        to: CropRect,
        duration_ms: u32,
        fps: u32,
        linked: &[String],
    ) -> Result<TransitionOutcome, CamError> {
        let Some(token) = self.progress.try_acquire() else {
            log::debug!("transition to {:?} rejected: another one is running", to);
            return Ok(TransitionOutcome::Rejected);
        };

        let session = AnimationSession::new(from, to, duration_ms, fps);
        let interval = session.frame_interval();
        let total = session.total_frames();
        log::debug!(
            "transition {:?} -> {:?}: {} frames over {}ms",
            from,
            to,
            total,
            duration_ms
        );

        for (i, t) in session.times().enumerate() {
            let rect = session.frame_at(t);
            self.crop.borrow_mut().set_current(rect);

            for source in linked {
                self.accessor.set_crop(source, None, rect).await?;
            }

            self.crop.borrow_mut().update_highlights(Some(to));

            if i + 1 < total {
                self.sleeper.sleep(interval).await;
            }
        }

        drop(token);
        self.crop.borrow_mut().update_highlights(None);

        Ok(TransitionOutcome::Completed { frames: total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::ObsClient;
    use crate::test_support::{FakeObs, FakeSleeper};
    use crate::types::{CanvasSize, VirtualPreset};
    use futures::executor::block_on;
    use proptest::prelude::*;

    struct Rig {
        obs: Rc<FakeObs>,
        sleeper: Rc<FakeSleeper>,
        crop: Rc<RefCell<CropState>>,
        animator: CropAnimator,
    }

    fn rig(sleeper: Rc<FakeSleeper>, start: CropRect, presets: Vec<VirtualPreset>) -> Rig {
        let obs = FakeObs::new();
        obs.add_source("Cam1", start.x, start.y, start.w, start.h);
        obs.add_source("Cam2", start.x, start.y, start.w, start.h);
        let crop = Rc::new(RefCell::new(CropState::new(
            CanvasSize::new(1920, 1080),
            960.0,
            start,
            presets,
        )));
        let animator = CropAnimator::new(
            CropAccessor::new(ObsClient::new(obs.clone())),
            sleeper.clone(),
            ProgressFlag::new(),
            crop.clone(),
        );
        Rig {
            obs,
            sleeper,
            crop,
            animator,
        }
    }

    fn linked() -> Vec<String> {
        vec!["Cam1".to_string(), "Cam2".to_string()]
    }

    #[test]
    fn easing_fixed_points() {
        assert_eq!(ease_cubic_in_out(0.0), 0.0);
        assert_eq!(ease_cubic_in_out(0.5), 0.5);
        assert_eq!(ease_cubic_in_out(1.0), 1.0);
        assert!(ease_cubic_in_out(0.25) < 0.25);
        assert!(ease_cubic_in_out(0.75) > 0.75);
    }

    #[test]
    fn frame_plan_matches_rate() {
        let session = AnimationSession::new(CropRect::default(), CropRect::default(), 1000, 30);
        assert_eq!(session.frame_count(), 30);
        let times: Vec<f64> = session.times().collect();
        assert_eq!(times.len(), 31);
        assert_eq!(session.total_frames(), 31);
        assert_eq!(times[0], 0.0);
        assert_eq!(times[30], 1.0);
    }

    #[test]
    fn frame_rate_is_capped_and_plan_is_lazy() {
        let session = AnimationSession::new(CropRect::default(), CropRect::new(1, 1, 1, 1), u32::MAX, u32::MAX);
        assert_eq!(session.fps, MAX_FPS);
        assert_eq!(u64::from(session.frame_count()), u64::from(u32::MAX) * u64::from(MAX_FPS) / 1000);
        assert_eq!(session.times().take(3).count(), 3);
        assert_eq!(session.frames().next(), Some(CropRect::default()));
    }

    #[test]
    fn zero_duration_jumps_straight_to_target() {
        let to = CropRect::new(5, 5, 50, 50);
        let session = AnimationSession::new(CropRect::new(0, 0, 100, 100), to, 0, 30);
        assert_eq!(session.frames().collect::<Vec<_>>(), vec![to]);
    }

    #[test]
    fn writes_every_frame_to_every_linked_source() {
        let from = CropRect::new(0, 0, 1920, 1080);
        let to = CropRect::new(480, 270, 960, 540);
        let r = rig(FakeSleeper::instant(), from, vec![]);

        let outcome = block_on(r.animator.run_transition(from, to, 100, 30, &linked())).unwrap();
        assert_eq!(outcome, TransitionOutcome::Completed { frames: 4 });

        for source in ["Cam1", "Cam2"] {
            let writes = r.obs.writes_to(source);
            assert_eq!(writes.len(), 4);
            assert_eq!(writes[0], from);
            assert_eq!(writes[3], to);
        }
        assert_eq!(r.sleeper.slept().len(), 3);
        assert_eq!(r.crop.borrow().current(), to);
        assert_eq!(r.crop.borrow().display_current(), to.to_display(0.5));
        assert!(!r.animator.is_running());
    }

    #[test]
    fn second_transition_is_rejected_while_running() {
        let from = CropRect::new(0, 0, 1920, 1080);
        let to = CropRect::new(0, 0, 960, 540);
        let other = CropRect::new(100, 100, 200, 200);
        let r = rig(FakeSleeper::yielding(), from, vec![]);
        let sources = linked();

        let (first, second) = block_on(async {
            futures::join!(
                r.animator.run_transition(from, to, 200, 10, &sources),
                async {
                    assert!(r.animator.is_running());
                    r.animator.run_transition(from, other, 200, 10, &sources).await
                }
            )
        });

        assert_eq!(first.unwrap(), TransitionOutcome::Completed { frames: 3 });
        assert_eq!(second.unwrap(), TransitionOutcome::Rejected);
        let writes = r.obs.writes_to("Cam1");
        assert_eq!(writes.len(), 3);
        assert!(!writes.contains(&other));
        assert_eq!(r.crop.borrow().current(), to);
    }

    #[test]
    fn preset_highlight_during_and_after_transition() {
        let from = CropRect::new(0, 0, 100, 100);
        let to = CropRect::new(10, 10, 100, 100);
        let presets = vec![VirtualPreset::new(1, from), VirtualPreset::new(2, to)];
        let r = rig(FakeSleeper::yielding(), from, presets);
        assert!(r.crop.borrow().preset(1).unwrap().current);

        let sources = vec!["Cam1".to_string()];
        block_on(async {
            futures::join!(
                r.animator.run_transition(from, to, 300, 10, &sources),
                async {
                    let crop = r.crop.borrow();
                    assert!(!crop.preset(1).unwrap().next);
                    assert!(crop.preset(2).unwrap().next);
                }
            )
        })
        .0
        .unwrap();

        let crop = r.crop.borrow();
        assert!(!crop.preset(2).unwrap().next);
        assert!(crop.preset(2).unwrap().current);
        assert!(!crop.preset(1).unwrap().current);
    }

    #[test]
    fn failed_write_releases_progress_token() {
        let from = CropRect::new(0, 0, 1920, 1080);
        let to = CropRect::new(0, 0, 960, 540);
        let r = rig(FakeSleeper::instant(), from, vec![]);
        r.obs.fail_after("SetSourceFilterSettings", 2);

        let err = block_on(r.animator.run_transition(from, to, 1000, 30, &linked())).unwrap_err();
        assert!(matches!(err, CamError::Remote { .. }));
        assert!(!r.animator.is_running());
        // First frame plus the failed attempt of the second.
        assert_eq!(r.obs.writes_to("Cam1").len(), 2);

        // A later transition may start again.
        r.obs.fail_after("SetSourceFilterSettings", usize::MAX);
        let outcome = block_on(r.animator.run_transition(from, to, 0, 30, &linked())).unwrap();
        assert_eq!(outcome, TransitionOutcome::Completed { frames: 1 });
    }

    fn rect_strategy() -> impl Strategy<Value = CropRect> {
        (0i32..1800, 0i32..1000, 1i32..1920, 1i32..1080)
            .prop_map(|(x, y, w, h)| CropRect::new(x, y, w, h))
    }

    proptest! {
        #[test]
        fn easing_is_monotonic(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ease_cubic_in_out(lo) <= ease_cubic_in_out(hi));
            prop_assert!((0.0..=1.0).contains(&ease_cubic_in_out(lo)));
        }

        #[test]
        fn transition_starts_at_from_and_ends_at_to(
            from in rect_strategy(),
            to in rect_strategy(),
            duration_ms in 0u32..6000,
            fps in 1u32..120,
        ) {
            let frames: Vec<CropRect> = AnimationSession::new(from, to, duration_ms, fps).frames().collect();
            prop_assert!(!frames.is_empty());
            if frames.len() > 1 {
                prop_assert_eq!(frames[0], from);
            }
            prop_assert_eq!(*frames.last().unwrap(), to);
        }
    }
}
