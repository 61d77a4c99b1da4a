//! Pointer interaction plumbing: transient host overrides and frame
//! coalescing.
//!
//! A drag or resize installs pointer listeners, a cursor override and text
//! selection suppression on the host surface. [`DragSession`] owns those
//! overrides and removes them exactly once, either on pointer-up or when the
//! session is dropped (e.g. the editor is torn down mid-drag).

use std::sync::Arc;

/// Identifier of a set of pointer listeners installed on the host.
pub type ListenerHandle = u64;

/// Cursor overrides applied during an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    Grabbing,
    ResizeEast,
    ResizeSouth,
    ResizeSouthEast,
    ColumnResize,
}

/// The surface hosting the editor (a window, a DOM document, a test double).
pub trait InteractionHost: Send + Sync {
    fn set_text_selection(&self, enabled: bool);
    fn set_cursor(&self, cursor: Option<CursorStyle>);
    fn attach_pointer_listeners(&self) -> ListenerHandle;
    fn detach_pointer_listeners(&self, handle: ListenerHandle);
}

/// Guard for one drag/resize interaction.
pub struct DragSession {
    host: Arc<dyn InteractionHost>,
    listeners: Option<ListenerHandle>,
}

impl DragSession {
    /// Installs listeners, the cursor override and selection suppression.
    pub fn begin(host: Arc<dyn InteractionHost>, cursor: CursorStyle) -> Self {
        host.set_text_selection(false);
        host.set_cursor(Some(cursor));
        let listeners = host.attach_pointer_listeners();
        tracing::trace!("[DragSession] begin: listeners={}", listeners);
        Self {
            host,
            listeners: Some(listeners),
        }
    }

    pub fn is_active(&self) -> bool {
        self.listeners.is_some()
    }

    /// Pointer-up: releases everything the session installed.
    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.listeners.take() {
            self.host.detach_pointer_listeners(handle);
            self.host.set_cursor(None);
            self.host.set_text_selection(true);
            tracing::trace!("[DragSession] released: listeners={}", handle);
        }
    }
}

impl Drop for DragSession {
    fn drop(&mut self) {
        if self.listeners.is_some() {
            tracing::debug!("[DragSession] released on teardown without pointer-up");
        }
        self.release();
    }
}

/// Keeps only the latest pointer update until the next rendering frame.
#[derive(Debug)]
pub struct FrameCoalescer<T> {
    pending: Option<T>,
    received: u64,
    frames: u64,
}

impl<T> Default for FrameCoalescer<T> {
    fn default() -> Self {
        Self {
            pending: None,
            received: 0,
            frames: 0,
        }
    }
}

impl<T> FrameCoalescer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a raw pointer update, replacing any update not yet applied.
    pub fn push(&mut self, update: T) {
        self.received += 1;
        self.pending = Some(update);
    }

    /// Called once per frame; yields the update to apply, if any.
    pub fn take_frame(&mut self) -> Option<T> {
        let update = self.pending.take();
        if update.is_some() {
            self.frames += 1;
        }
        update
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// (raw updates received, frames that applied an update)
    pub fn stats(&self) -> (u64, u64) {
        (self.received, self.frames)
    }
}
