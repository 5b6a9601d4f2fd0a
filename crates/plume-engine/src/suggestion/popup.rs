//! In-memory popup list and positioner.
//!
//! Hosts without a DOM (the terminal demo, tests) render suggestions from
//! the shared [`PopupState`] and read placements from a [`PopupLayer`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{PopupHandle, PopupPositioner, SuggestionProps, SuggestionRenderer};
use crate::geometry::{Point, Rect};
use crate::nodes::ElementId;

/// What the popup list currently shows
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PopupState {
    pub open: bool,
    pub element: Option<ElementId>,
    pub props: Option<SuggestionProps>,
}

impl PopupState {
    /// Rows to draw: item labels, or the empty message when nothing matches
    pub fn lines(&self) -> Vec<String> {
        let Some(props) = &self.props else {
            return Vec::new();
        };
        if props.items.is_empty() {
            return vec![props.empty_message.to_string()];
        }
        props
            .items
            .iter()
            .map(|item| match &item.detail {
                Some(detail) => format!("{} - {}", item.label, detail),
                None => item.label.clone(),
            })
            .collect()
    }
}

/// Renderer writing into a shared [`PopupState`]
pub struct ListRenderer {
    state: Rc<RefCell<PopupState>>,
}

impl ListRenderer {
    pub fn new(state: Rc<RefCell<PopupState>>) -> Self {
        Self { state }
    }
}

impl SuggestionRenderer for ListRenderer {
    fn on_open(&mut self, props: &SuggestionProps) -> ElementId {
        let element = ElementId::new();
        let mut state = self.state.borrow_mut();
        state.open = true;
        state.element = Some(element);
        state.props = Some(props.clone());
        element
    }

    fn on_update(&mut self, props: &SuggestionProps) {
        self.state.borrow_mut().props = Some(props.clone());
    }

    fn on_close(&mut self) {
        *self.state.borrow_mut() = PopupState::default();
    }
}

/// Floating elements currently placed, keyed by their content element
#[derive(Debug, Default)]
pub struct PopupLayer {
    placed: HashMap<ElementId, Point>,
}

impl PopupLayer {
    pub fn positioner(layer: Rc<RefCell<PopupLayer>>) -> LayerPositioner {
        LayerPositioner { layer }
    }

    pub fn live_count(&self) -> usize {
        self.placed.len()
    }

    /// Top-left corner of the popup holding `element`
    pub fn position_of(&self, element: ElementId) -> Option<Point> {
        self.placed.get(&element).copied()
    }
}

/// Bottom-start placement: the popup's top-left sits at the anchor's
/// bottom-left corner
fn bottom_start(anchor: Rect) -> Point {
    Point::new(anchor.left, anchor.bottom())
}

pub struct LayerPositioner {
    layer: Rc<RefCell<PopupLayer>>,
}

impl PopupPositioner for LayerPositioner {
    fn position(&mut self, anchor: Rect, content: ElementId) -> Box<dyn PopupHandle> {
        self.layer
            .borrow_mut()
            .placed
            .insert(content, bottom_start(anchor));
        Box::new(LayerHandle {
            layer: self.layer.clone(),
            content,
        })
    }
}

struct LayerHandle {
    layer: Rc<RefCell<PopupLayer>>,
    content: ElementId,
}

impl PopupHandle for LayerHandle {
    fn update(&mut self, anchor: Rect) {
        if let Some(at) = self.layer.borrow_mut().placed.get_mut(&self.content) {
            *at = bottom_start(anchor);
        }
    }

    fn destroy(&mut self) {
        self.layer.borrow_mut().placed.remove(&self.content);
    }
}
