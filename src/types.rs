// Strong typing over loose numbers. Source-pixel crops, display-space rects, presets and modes.
// Source coordinates are integers in the capture source's native space; display rects are derived.

use serde::{Deserialize, Serialize};

/// Crop rectangle in source pixels (the OBS crop filter's left/top/cx/cy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct CropRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl CropRect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        CropRect { x, y, w, h }
    }

    /// Whether the rectangle is non-empty and lies inside the canvas.
    pub fn fits_within(&self, canvas: CanvasSize) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.w > 0
            && self.h > 0
            && i64::from(self.x) + i64::from(self.w) <= i64::from(canvas.width)
            && i64::from(self.y) + i64::from(self.h) <= i64::from(canvas.height)
    }

    /// Interpolate each field independently, rounding the per-field delta.
    /// `v = 0` yields `from` and `v = 1` yields `to` exactly.
    pub fn interpolate(from: CropRect, to: CropRect, v: f64) -> CropRect {
        let step = |a: i32, b: i32| a + (f64::from(b - a) * v).round() as i32;
        CropRect {
            x: step(from.x, to.x),
            y: step(from.y, to.y),
            w: step(from.w, to.w),
            h: step(from.h, to.h),
        }
    }

    pub fn to_display(&self, scale: f64) -> DisplayRect {
        DisplayRect {
            x: f64::from(self.x) * scale,
            y: f64::from(self.y) * scale,
            w: f64::from(self.w) * scale,
            h: f64::from(self.h) * scale,
        }
    }
}

/// On-screen rectangle (CSS pixels relative to the canvas origin). Never authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl DisplayRect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        DisplayRect { x, y, w, h }
    }

    /// Map back into source pixels, rounding each field to the nearest integer.
    /// Sizes are rounded first and positions clamped after, so independent rounding
    /// of an edge-flush rectangle never pushes it past the canvas.
    pub fn to_crop(&self, scale: f64, canvas: CanvasSize) -> CropRect {
        let max_w = i32::try_from(canvas.width).unwrap_or(i32::MAX);
        let max_h = i32::try_from(canvas.height).unwrap_or(i32::MAX);
        let w = ((self.w / scale).round() as i32).max(1).min(max_w);
        let h = ((self.h / scale).round() as i32).max(1).min(max_h);
        CropRect {
            x: ((self.x / scale).round() as i32).min(max_w - w).max(0),
            y: ((self.y / scale).round() as i32).min(max_h - h).max(0),
            w,
            h,
        }
    }
}

/// Native size of the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        CanvasSize { width, height }
    }

    pub fn aspect(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Which camera set and preset list is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Virtual,
    Physical,
}

/// Named crop rectangle bound to a digit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPreset {
    pub digit: u8,
    pub rect: CropRect,
    /// The current crop equals this preset.
    pub current: bool,
    /// A running transition targets this preset.
    pub next: bool,
}

impl VirtualPreset {
    pub fn new(digit: u8, rect: CropRect) -> Self {
        VirtualPreset {
            digit,
            rect,
            current: false,
            next: false,
        }
    }
}

/// Device-side preset index of the PTZ camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalPreset {
    pub digit: u8,
}

/// What OBS Studio currently shows, as far as the panel knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SceneStatus {
    pub studio_mode: bool,
    pub preview_scene: String,
    pub program_scene: String,
    /// Any of the configured camera sources is visible in program.
    pub source_active: bool,
}
