// The panel's model of the virtual camera crop: authoritative CropRect plus derived display geometry.

use crate::types::{CanvasSize, CropRect, DisplayRect, VirtualPreset};

/// Owned crop state shared by the animation engine, the gesture handling and the view.
#[derive(Debug, Clone)]
pub struct CropState {
    canvas: CanvasSize,
    scale: f64,
    current: CropRect,
    display_current: DisplayRect,
    display_next: DisplayRect,
    presets: Vec<VirtualPreset>,
}

impl CropState {
    /// `viewport_width` is the CSS width the canvas is drawn at.
    pub fn new(canvas: CanvasSize, viewport_width: f64, current: CropRect, presets: Vec<VirtualPreset>) -> Self {
        let scale = viewport_width / f64::from(canvas.width);
        let mut state = CropState {
            canvas,
            scale,
            current,
            display_current: current.to_display(scale),
            display_next: current.to_display(scale),
            presets,
        };
        state.update_highlights(None);
        state
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Display pixels per source pixel.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn current(&self) -> CropRect {
        self.current
    }

    pub fn display_current(&self) -> DisplayRect {
        self.display_current
    }

    pub fn display_next(&self) -> DisplayRect {
        self.display_next
    }

    /// Size of the whole canvas on screen.
    pub fn display_canvas(&self) -> (f64, f64) {
        (
            f64::from(self.canvas.width) * self.scale,
            f64::from(self.canvas.height) * self.scale,
        )
    }

    pub fn presets(&self) -> &[VirtualPreset] {
        &self.presets
    }

    pub fn preset(&self, digit: u8) -> Option<VirtualPreset> {
        self.presets.iter().copied().find(|p| p.digit == digit)
    }

    /// Replace the current crop and recompute its display rect.
    pub fn set_current(&mut self, rect: CropRect) {
        self.current = rect;
        self.display_current = rect.to_display(self.scale);
    }

    pub fn set_display_next(&mut self, rect: DisplayRect) {
        self.display_next = rect;
    }

    /// Flag presets equal to the current crop and to the pending target, if any.
    pub fn update_highlights(&mut self, next: Option<CropRect>) {
        let current = self.current;
        for preset in &mut self.presets {
            preset.current = preset.rect == current;
            preset.next = next == Some(preset.rect);
        }
    }
}
