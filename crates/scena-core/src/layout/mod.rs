//! Layout engine.
//!
//! - `geometry`: percentage rectangles, pointer-driven move and resize
//! - `panes`: divider redistribution and enlarge/restore inside a box
//! - `interaction`: drag session guard and per-frame update coalescing

mod geometry;
mod interaction;
mod panes;

pub use geometry::{MIN_BOX_PERCENT, MoveGrab, Point, Rect, ResizeHandle, SurfaceBounds, resize_rect};
pub use interaction::{CursorStyle, DragSession, FrameCoalescer, InteractionHost, ListenerHandle};
pub use panes::{
    DividerDrag, ENLARGED_PANE_PERCENT, Enlargement, MIN_PANE_PERCENT, PaneLayout, redistribute,
};
