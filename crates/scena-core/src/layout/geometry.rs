//! Percentage geometry and pointer-driven move/resize.
//!
//! Box geometry is stored as percentages of the editing surface. Pixel
//! positions only exist at interaction time, and are always converted
//! against the surface bounds passed in at that moment so a surface resized
//! mid-drag does not misplace boxes.

use serde::{Deserialize, Serialize};

/// Smallest width/height a box may be resized to, in percent.
pub const MIN_BOX_PERCENT: f64 = 10.0;

/// A rectangle in percent of the container (0–100 on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns a copy satisfying `0 <= x`, `x + width <= 100` and the same
    /// for the vertical axis. Size is kept when possible; position yields.
    pub fn clamped(self) -> Self {
        let width = clamp_size(self.width);
        let height = clamp_size(self.height);
        Self {
            x: clamp_origin(self.x, width),
            y: clamp_origin(self.y, height),
            width,
            height,
        }
    }

    pub fn within_bounds(&self) -> bool {
        const EPS: f64 = 1e-9;
        self.x >= -EPS
            && self.y >= -EPS
            && self.x + self.width <= 100.0 + EPS
            && self.y + self.height <= 100.0 + EPS
    }
}

fn clamp_size(size: f64) -> f64 {
    if size.is_nan() {
        return MIN_BOX_PERCENT;
    }
    size.clamp(MIN_BOX_PERCENT, 100.0)
}

fn clamp_origin(origin: f64, size: f64) -> f64 {
    if origin.is_nan() {
        return 0.0;
    }
    origin.clamp(0.0, 100.0 - size)
}

/// Live pixel bounds of the editing surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceBounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceBounds {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Pointer position in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// State captured when a box is grabbed for moving.
///
/// Only the pointer offset from the box's top-left corner is kept; the
/// surface bounds are supplied again on every update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveGrab {
    offset_x: f64,
    offset_y: f64,
}

impl MoveGrab {
    pub fn begin(rect: Rect, bounds: SurfaceBounds, pointer: Point) -> Self {
        let box_left = bounds.left + rect.x / 100.0 * bounds.width;
        let box_top = bounds.top + rect.y / 100.0 * bounds.height;
        Self {
            offset_x: pointer.x - box_left,
            offset_y: pointer.y - box_top,
        }
    }

    /// Position of the grabbed box for the given pointer, clamped to
    /// `[0, 100 - size]` on both axes.
    pub fn update(&self, rect: Rect, bounds: SurfaceBounds, pointer: Point) -> Rect {
        if bounds.is_degenerate() {
            return rect;
        }
        let x = (pointer.x - bounds.left - self.offset_x) / bounds.width * 100.0;
        let y = (pointer.y - bounds.top - self.offset_y) / bounds.height * 100.0;
        Rect {
            x: clamp_origin(x, rect.width),
            y: clamp_origin(y, rect.height),
            ..rect
        }
    }
}

/// Resize handle grabbed on a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeHandle {
    /// Right edge
    E,
    /// Bottom edge
    S,
    /// Bottom-right corner
    Se,
}

impl ResizeHandle {
    fn adjusts_width(self) -> bool {
        matches!(self, ResizeHandle::E | ResizeHandle::Se)
    }

    fn adjusts_height(self) -> bool {
        matches!(self, ResizeHandle::S | ResizeHandle::Se)
    }
}

/// Size of the box for the given pointer. The origin never moves; each
/// dimension is clamped to `[MIN_BOX_PERCENT, 100 - origin]`.
pub fn resize_rect(rect: Rect, handle: ResizeHandle, bounds: SurfaceBounds, pointer: Point) -> Rect {
    if bounds.is_degenerate() {
        return rect;
    }
    let mut resized = rect;
    if handle.adjusts_width() {
        let right = (pointer.x - bounds.left) / bounds.width * 100.0;
        resized.width = clamp_extent(right - rect.x, rect.x);
    }
    if handle.adjusts_height() {
        let bottom = (pointer.y - bounds.top) / bounds.height * 100.0;
        resized.height = clamp_extent(bottom - rect.y, rect.y);
    }
    resized
}

fn clamp_extent(size: f64, origin: f64) -> f64 {
    size.max(MIN_BOX_PERCENT).min(100.0 - origin)
}
