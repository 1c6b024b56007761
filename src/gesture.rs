// Drag-and-wheel editing of the next crop, in display space.
// The working rectangle never leaves the on-screen canvas.

use crate::types::DisplayRect;

/// Smallest working-rectangle height in display pixels; width follows the aspect ratio.
pub const MIN_DISPLAY_HEIGHT: f64 = 100.0;

/// On-screen canvas the working rectangle must stay inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayBounds {
    pub width: f64,
    pub height: f64,
    /// Source canvas width / height.
    pub aspect: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Dragging {
        pointer_x: f64,
        pointer_y: f64,
        next: DisplayRect,
    },
}

/// Operator gesture on the current-crop handle.
#[derive(Debug, Clone, Default)]
pub struct CropGesture {
    state: Gesture,
}

impl CropGesture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Gesture {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, Gesture::Dragging { .. })
    }

    /// Working rectangle while dragging.
    pub fn next(&self) -> Option<DisplayRect> {
        match self.state {
            Gesture::Dragging { next, .. } => Some(next),
            Gesture::Idle => None,
        }
    }

    /// Start dragging from `current`. Ignored while a drag is already running.
    pub fn press(&mut self, pointer_x: f64, pointer_y: f64, current: DisplayRect) -> bool {
        if self.is_dragging() {
            return false;
        }
        self.state = Gesture::Dragging {
            pointer_x,
            pointer_y,
            next: current,
        };
        true
    }

    /// Translate the working rectangle by the pointer delta.
    pub fn pointer_move(&mut self, x: f64, y: f64, bounds: DisplayBounds) -> Option<DisplayRect> {
        let Gesture::Dragging {
            pointer_x,
            pointer_y,
            next,
        } = &mut self.state
        else {
            return None;
        };

        next.x += x - *pointer_x;
        next.y += y - *pointer_y;
        *pointer_x = x;
        *pointer_y = y;
        keep_inside(next, bounds);
        Some(*next)
    }

    /// Resize the working rectangle by `delta` display pixels of height, keeping
    /// the aspect ratio and the rectangle's center, then pull it back inside the canvas.
    pub fn wheel(&mut self, delta: f64, bounds: DisplayBounds) -> Option<DisplayRect> {
        let Gesture::Dragging { next, .. } = &mut self.state else {
            return None;
        };

        let center_x = next.x + next.w / 2.0;
        let center_y = next.y + next.h / 2.0;

        let h = (next.h + delta).max(MIN_DISPLAY_HEIGHT).min(bounds.height);
        let w = (next.w + delta * bounds.aspect)
            .max(MIN_DISPLAY_HEIGHT * bounds.aspect)
            .min(bounds.width);

        next.w = w;
        next.h = h;
        next.x = center_x - w / 2.0;
        next.y = center_y - h / 2.0;
        keep_inside(next, bounds);
        Some(*next)
    }

    /// Finish the drag and hand back the working rectangle.
    pub fn release(&mut self) -> Option<DisplayRect> {
        let next = self.next();
        self.state = Gesture::Idle;
        next
    }

    /// Abort the drag; the working rectangle is discarded.
    pub fn cancel(&mut self) {
        self.state = Gesture::Idle;
    }
}

fn keep_inside(rect: &mut DisplayRect, bounds: DisplayBounds) {
    rect.x = rect.x.min(bounds.width - rect.w).max(0.0);
    rect.y = rect.y.min(bounds.height - rect.h).max(0.0);
}
