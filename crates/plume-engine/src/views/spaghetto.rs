use std::any::Any;

use crate::node_view::{NodeReplacer, ViewComponent, ViewEvent};
use crate::nodes::{DocumentNode, ElementId};

pub const SPAGHETTO_IMAGE: &str = "images/spaghetto.svg";

/// Static full-width image; it never edits its node
#[derive(Default)]
pub struct SpaghettoView {
    element: ElementId,
    node: Option<DocumentNode>,
}

impl SpaghettoView {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViewComponent for SpaghettoView {
    fn element(&self) -> ElementId {
        self.element
    }

    fn set_node(&mut self, node: DocumentNode) {
        self.node = Some(node);
    }

    fn set_replacer(&mut self, _replacer: NodeReplacer) {}

    fn detect_changes(&mut self) {}

    fn handle_event(&mut self, _event: &ViewEvent) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("[img {SPAGHETTO_IMAGE} width=100%]")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
