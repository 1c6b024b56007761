// Panel orchestration: wires OBS, the crop engine, the PTZ sequencer and the operator's gestures
// into one object the browser layer drives. All methods take &self; state sits in cells so the
// panel can be shared between spawned tasks on the single browser thread.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::animation::{CropAnimator, TransitionOutcome};
use crate::config::PanelConfig;
use crate::crop_filter::CropAccessor;
use crate::crop_state::CropState;
use crate::error::CamError;
use crate::gesture::{CropGesture, DisplayBounds};
use crate::obs::{ObsClient, ObsEvent, ObsRequests, ACTIVATE_CAMERA_REALM};
use crate::poller::{ChangePoller, PollSubscription};
use crate::ptz::{PtzTransport, RecallSequencer};
use crate::schedule::{ProgressFlag, Sleeper};
use crate::types::{CropRect, DisplayRect, Mode, PhysicalPreset, SceneStatus, VirtualPreset};

/// Delay before announcing a camera activation to other panels.
pub const ACTIVATION_BROADCAST_DELAY: Duration = Duration::from_millis(500);
/// Delay between a scene switch and re-reading source activity.
pub const SCENE_SETTLE_DELAY: Duration = Duration::from_millis(100);
/// Period of the background source-activity refresh.
pub const SOURCE_ACTIVE_PERIOD: Duration = Duration::from_secs(5);

/// Index into the configured durations used until the operator picks a speed.
const DEFAULT_SPEED: usize = 1;

/// What an activation button switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationTarget {
    /// Show this camera in the program scene.
    Camera,
    /// Switch to the cropped virtual camera.
    Virtual,
    /// Switch to the PTZ camera.
    Physical,
}

impl FromStr for ActivationTarget {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "camera" => Ok(ActivationTarget::Camera),
            "virtual" => Ok(ActivationTarget::Virtual),
            "physical" => Ok(ActivationTarget::Physical),
            other => Err(CamError::config(format!("unknown activation target \"{}\"", other))),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PreviewState {
    img: Option<String>,
    shown: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewView {
    pub enabled: bool,
    pub shown: bool,
    pub img: Option<String>,
}

/// Snapshot of everything the page renders.
#[derive(Debug, Clone, Serialize)]
pub struct PanelView {
    pub title: String,
    pub mode: Mode,
    pub transparent: bool,
    pub debug: bool,
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub crop: CropRect,
    pub current: DisplayRect,
    pub next: DisplayRect,
    pub dragging: bool,
    pub progressing: bool,
    pub recalling: bool,
    pub speed: usize,
    pub virtual_presets: Vec<VirtualPreset>,
    pub physical_presets: Vec<PhysicalPreset>,
    pub scenes: SceneStatus,
    pub preview: PreviewView,
}

pub struct Panel {
    config: PanelConfig,
    obs: ObsClient,
    sleeper: Rc<dyn Sleeper>,
    progress: ProgressFlag,
    crop: Rc<RefCell<CropState>>,
    animator: CropAnimator,
    poller: ChangePoller,
    recaller: RecallSequencer,
    gesture: RefCell<CropGesture>,
    mode: Cell<Mode>,
    speed: Cell<usize>,
    scenes: RefCell<SceneStatus>,
    preview: RefCell<PreviewState>,
}

impl Panel {
    /// Read the initial state from OBS Studio and assemble the panel.
    ///
    /// `viewport_width` is the CSS width the canvas is drawn at.
    pub async fn connect(
        config: PanelConfig,
        viewport_width: f64,
        transport: Rc<dyn ObsRequests>,
        ptz: Rc<dyn PtzTransport>,
        sleeper: Rc<dyn Sleeper>,
    ) -> Result<Panel, CamError> {
        let obs = ObsClient::new(transport);
        let version = obs.version().await?;
        log::info!(
            "connected to OBS Studio {} (obs-websocket {})",
            version.obs_studio_version,
            version.obs_websocket_version
        );

        let accessor = CropAccessor::new(obs.clone());
        let (primary, others) = config
            .sources_virtual
            .split_first()
            .ok_or_else(|| CamError::config("no virtual camera sources configured"))?;
        let current = accessor.get_crop(primary, None).await?;
        for source in others {
            if let Err(e) = accessor.get_crop(source, None).await {
                log::warn!("virtual camera source \"{}\" has no usable crop: {}", source, e);
            }
        }

        let crop = Rc::new(RefCell::new(CropState::new(
            config.canvas,
            viewport_width,
            current,
            config.presets_virtual.clone(),
        )));
        let progress = ProgressFlag::new();
        let animator = CropAnimator::new(accessor.clone(), sleeper.clone(), progress.clone(), crop.clone());
        let poller = ChangePoller::new(accessor, sleeper.clone(), progress.clone());
        let recaller = RecallSequencer::new(&config.device, ptz, sleeper.clone());

        let studio_mode = obs.studio_mode().await?;
        let program_scene = obs.current_scene().await?;
        let preview_scene = if studio_mode {
            obs.preview_scene().await?
        } else {
            program_scene.clone()
        };

        let preview = PreviewState {
            img: None,
            shown: config.preview.is_some(),
        };

        let panel = Panel {
            config,
            obs,
            sleeper,
            progress,
            crop,
            animator,
            poller,
            recaller,
            gesture: RefCell::new(CropGesture::new()),
            mode: Cell::new(Mode::Virtual),
            speed: Cell::new(DEFAULT_SPEED),
            scenes: RefCell::new(SceneStatus {
                studio_mode,
                preview_scene,
                program_scene,
                source_active: false,
            }),
            preview: RefCell::new(preview),
        };
        panel.refresh_source_active().await;
        Ok(panel)
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    pub fn is_progressing(&self) -> bool {
        self.progress.is_held()
    }

    /// Transition duration for the selected speed.
    pub fn duration(&self) -> u32 {
        self.config.durations[self.speed.get()]
    }

    pub fn set_speed(&self, index: usize) -> Result<(), CamError> {
        if index >= self.config.durations.len() {
            return Err(CamError::config(format!("no transition speed #{}", index)));
        }
        self.speed.set(index);
        Ok(())
    }

    /// Go to preset `digit` of the active mode. Ignored while a crop transition runs.
    pub async fn set_preset(&self, digit: u8) -> Result<(), CamError> {
        if self.progress.is_held() {
            log::debug!("preset #{} ignored: transition in progress", digit);
            return Ok(());
        }
        match self.mode.get() {
            Mode::Virtual => {
                let preset = self
                    .crop
                    .borrow()
                    .preset(digit)
                    .ok_or(CamError::UnknownPreset(digit))?;
                let (current, scale) = {
                    let crop = self.crop.borrow();
                    (crop.current(), crop.scale())
                };
                if current == preset.rect {
                    return Ok(());
                }
                self.crop
                    .borrow_mut()
                    .set_display_next(preset.rect.to_display(scale));
                self.transition_to(preset.rect).await?;
                Ok(())
            }
            Mode::Physical => {
                if !self.config.presets_physical.iter().any(|p| p.digit == digit) {
                    return Err(CamError::UnknownPreset(digit));
                }
                self.recaller.recall(digit).await;
                Ok(())
            }
        }
    }

    async fn transition_to(&self, to: CropRect) -> Result<TransitionOutcome, CamError> {
        let from = self.crop.borrow().current();
        self.animator
            .run_transition(from, to, self.duration(), self.config.fps, &self.config.sources_virtual)
            .await
    }

    fn bounds(&self) -> DisplayBounds {
        let crop = self.crop.borrow();
        let (width, height) = crop.display_canvas();
        DisplayBounds {
            width,
            height,
            aspect: crop.canvas().aspect(),
        }
    }

    /// Grab the current-crop handle. Pointer coordinates are relative to the canvas.
    pub fn press(&self, x: f64, y: f64) -> bool {
        if self.progress.is_held() {
            return false;
        }
        let current = self.crop.borrow().display_current();
        let started = self.gesture.borrow_mut().press(x, y, current);
        if started {
            self.crop.borrow_mut().set_display_next(current);
        }
        started
    }

    pub fn pointer_move(&self, x: f64, y: f64) {
        let bounds = self.bounds();
        let next = self.gesture.borrow_mut().pointer_move(x, y, bounds);
        if let Some(next) = next {
            self.crop.borrow_mut().set_display_next(next);
        }
    }

    pub fn wheel(&self, delta: f64) {
        let bounds = self.bounds();
        let next = self.gesture.borrow_mut().wheel(delta, bounds);
        if let Some(next) = next {
            self.crop.borrow_mut().set_display_next(next);
        }
    }

    /// Commit the drag. Returns `None` when nothing was dragging or the crop is unchanged.
    pub async fn release(&self) -> Result<Option<TransitionOutcome>, CamError> {
        let Some(next) = self.gesture.borrow_mut().release() else {
            return Ok(None);
        };
        let (from, to) = {
            let mut crop = self.crop.borrow_mut();
            crop.set_display_next(next);
            (crop.current(), next.to_crop(crop.scale(), crop.canvas()))
        };
        if from == to {
            return Ok(None);
        }
        self.transition_to(to).await.map(Some)
    }

    pub fn cancel(&self) {
        self.gesture.borrow_mut().cancel();
    }

    /// Adopt a crop changed outside the panel. Ignored while animating or when nothing changed.
    pub fn apply_external_change(&self, rect: CropRect) -> bool {
        if self.progress.is_held() {
            return false;
        }
        let mut crop = self.crop.borrow_mut();
        if !rect.fits_within(crop.canvas()) {
            log::warn!("ignoring external crop {:?} outside the {:?} canvas", rect, crop.canvas());
            return false;
        }
        if crop.current() == rect {
            return false;
        }
        log::info!("crop changed outside the panel to {:?}", rect);
        crop.set_current(rect);
        crop.update_highlights(None);
        true
    }

    /// Start polling the primary virtual source for external crop changes.
    pub async fn start_watching(&self) -> Result<PollSubscription, CamError> {
        let source = self
            .config
            .sources_virtual
            .first()
            .ok_or_else(|| CamError::config("no virtual camera sources configured"))?;
        self.poller.start(source).await
    }

    pub fn stop_watching(&self) {
        self.poller.stop();
    }

    /// Show the first `scene:item` of the target's list and hide the rest.
    pub async fn activate(&self, target: ActivationTarget) -> Result<(), CamError> {
        let items = match target {
            ActivationTarget::Camera => &self.config.activate_camera,
            ActivationTarget::Virtual => {
                self.mode.set(Mode::Virtual);
                &self.config.activate_virtual
            }
            ActivationTarget::Physical => {
                self.mode.set(Mode::Physical);
                &self.config.activate_physical
            }
        };

        for (i, entry) in items.iter().enumerate() {
            let Some((scene, item)) = entry
                .rsplit_once(':')
                .filter(|(scene, item)| !scene.is_empty() && !item.is_empty())
            else {
                log::warn!("ignoring malformed scene item \"{}\" and the ones after it", entry);
                return Ok(());
            };
            self.obs.set_scene_item_visible(scene, item, i == 0).await?;
        }

        if target == ActivationTarget::Camera {
            self.sleeper.sleep(ACTIVATION_BROADCAST_DELAY).await;
            self.obs.broadcast(ACTIVATE_CAMERA_REALM).await?;
        }
        Ok(())
    }

    pub async fn handle_event(&self, event: ObsEvent) -> Result<(), CamError> {
        match event {
            ObsEvent::StudioModeSwitched { new_state } => {
                let mut scenes = self.scenes.borrow_mut();
                let program = scenes.program_scene.clone();
                scenes.studio_mode = new_state;
                scenes.preview_scene = program;
            }
            ObsEvent::SwitchScenes { scene_name } => {
                {
                    let mut scenes = self.scenes.borrow_mut();
                    if !scenes.studio_mode {
                        scenes.preview_scene = scene_name.clone();
                    }
                    scenes.program_scene = scene_name;
                }
                self.sleeper.sleep(SCENE_SETTLE_DELAY).await;
                self.refresh_source_active().await;
            }
            ObsEvent::PreviewSceneChanged { scene_name } => {
                let mut scenes = self.scenes.borrow_mut();
                if scenes.studio_mode {
                    scenes.preview_scene = scene_name;
                }
            }
            ObsEvent::CustomMessage { realm } => {
                log::debug!("custom message in realm \"{}\"", realm);
                if realm == ACTIVATE_CAMERA_REALM {
                    self.refresh_source_active().await;
                }
            }
            ObsEvent::Other(_) => {}
        }
        Ok(())
    }

    /// Whether any virtual or physical source of this camera is currently shown.
    /// A source OBS cannot report on counts as inactive.
    pub async fn refresh_source_active(&self) -> bool {
        let mut active = false;
        let sources = self
            .config
            .sources_virtual
            .iter()
            .chain(self.config.sources_physical.iter());
        for source in sources {
            match self.obs.source_active(source).await {
                Ok(true) => {
                    active = true;
                    break;
                }
                Ok(false) => {}
                Err(e) => log::warn!("activity of source \"{}\" unknown: {}", source, e),
            }
        }
        self.scenes.borrow_mut().source_active = active;
        active
    }

    /// Gap between two preview screenshots, if a preview is configured.
    pub fn preview_period(&self) -> Option<Duration> {
        self.config
            .preview
            .as_ref()
            .map(|p| Duration::from_secs_f64(1.0 / p.fps))
    }

    /// Fetch one preview frame. Returns `false` when the preview is off.
    pub async fn capture_preview(&self) -> Result<bool, CamError> {
        let Some(preview) = &self.config.preview else {
            return Ok(false);
        };
        if !self.preview.borrow().shown {
            return Ok(false);
        }
        let (width, height) = self.crop.borrow().display_canvas();
        let img = self
            .obs
            .screenshot(&preview.source, width.round() as u32, height.round() as u32)
            .await?;
        self.preview.borrow_mut().img = Some(img);
        Ok(true)
    }

    pub fn toggle_preview(&self) -> bool {
        let mut preview = self.preview.borrow_mut();
        preview.shown = !preview.shown;
        preview.shown
    }

    pub fn view(&self) -> PanelView {
        let crop = self.crop.borrow();
        let (canvas_width, canvas_height) = crop.display_canvas();
        let gesture = self.gesture.borrow();
        let preview = self.preview.borrow();
        PanelView {
            title: self.config.title.clone(),
            mode: self.mode.get(),
            transparent: self.config.transparent,
            debug: self.config.debug,
            canvas_width,
            canvas_height,
            crop: crop.current(),
            current: crop.display_current(),
            next: gesture.next().unwrap_or_else(|| crop.display_next()),
            dragging: gesture.is_dragging(),
            progressing: self.progress.is_held(),
            recalling: self.recaller.is_busy(),
            speed: self.speed.get(),
            virtual_presets: crop.presets().to_vec(),
            physical_presets: self.config.presets_physical.clone(),
            scenes: self.scenes.borrow().clone(),
            preview: PreviewView {
                enabled: self.config.preview.is_some(),
                shown: preview.shown,
                img: preview.img.clone(),
            },
        }
    }
}
