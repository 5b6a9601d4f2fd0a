//! Drag-resize sessions for embedded media.
//!
//! A session starts on pointer-down over a resize handle and owns the
//! document-wide pointer listeners for exactly as long as the drag lasts.
//! Widths are clamped to the configured limits on every move.

use crate::listeners::{EventKind, EventTarget, ListenerScope, SharedHub};

pub const DEFAULT_MIN_WIDTH: u32 = 100;
pub const DEFAULT_MAX_WIDTH: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeLimits {
    pub min_width: u32,
    pub max_width: u32,
}

impl Default for ResizeLimits {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_WIDTH,
            max_width: DEFAULT_MAX_WIDTH,
        }
    }
}

impl ResizeLimits {
    pub fn new(min_width: u32, max_width: u32) -> Self {
        Self {
            min_width,
            max_width,
        }
    }

    pub fn clamp(&self, width: f64) -> f64 {
        width
            .max(f64::from(self.min_width))
            .min(f64::from(self.max_width))
    }
}

pub struct DragResizeSession {
    start_pointer_x: f64,
    start_width: f64,
    current_width: f64,
    limits: ResizeLimits,
    listeners: ListenerScope,
}

impl DragResizeSession {
    /// Start a drag. The starting width is the node's stored width, or the
    /// rendered width when the node has none.
    pub fn begin(
        hub: SharedHub,
        pointer_x: f64,
        node_width: Option<u32>,
        rendered_width: f64,
        limits: ResizeLimits,
    ) -> Self {
        let start_width = node_width
            .filter(|w| *w > 0)
            .map(f64::from)
            .unwrap_or(rendered_width);

        let mut listeners = ListenerScope::new(hub);
        listeners.listen(EventTarget::Document, EventKind::PointerMove);
        listeners.listen(EventTarget::Document, EventKind::PointerUp);
        log::debug!("resize started at x={pointer_x} width={start_width}");

        Self {
            start_pointer_x: pointer_x,
            start_width,
            current_width: start_width,
            limits,
            listeners,
        }
    }

    /// Apply a pointer move and return the new width in whole pixels
    pub fn pointer_move(&mut self, x: f64) -> u32 {
        let delta = x - self.start_pointer_x;
        self.current_width = self.limits.clamp(self.start_width + delta);
        self.current_width()
    }

    pub fn current_width(&self) -> u32 {
        self.current_width.round() as u32
    }

    pub fn start_width(&self) -> f64 {
        self.start_width
    }

    pub fn is_listening(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// End the drag on pointer-up, removing the document listeners
    pub fn finish(mut self) -> u32 {
        self.listeners.release();
        log::debug!("resize finished at width={}", self.current_width());
        self.current_width()
    }
}
