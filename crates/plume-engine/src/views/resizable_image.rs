use std::any::Any;

use crate::listeners::{EventKind, EventTarget, ListenerScope, SharedHub};
use crate::node_view::{NodeReplacer, ViewComponent, ViewEvent};
use crate::nodes::{DocumentNode, ElementId, NodeKind, ResizableImageAttrs, TextBlockKind};
use crate::resize::{DragResizeSession, ResizeLimits};

/// Image view with a selection outline, a drag handle and a remove button
pub struct ResizableImageView {
    element: ElementId,
    hub: SharedHub,
    limits: ResizeLimits,
    node: Option<DocumentNode>,
    replacer: Option<NodeReplacer>,
    selected: bool,
    /// Document click listener, held while the image is selected
    outside_click: Option<ListenerScope>,
    drag: Option<DragResizeSession>,
    current_width: Option<u32>,
    renders: usize,
}

impl ResizableImageView {
    pub fn new(hub: SharedHub, limits: ResizeLimits) -> Self {
        Self {
            element: ElementId::new(),
            hub,
            limits,
            node: None,
            replacer: None,
            selected: false,
            outside_click: None,
            drag: None,
            current_width: None,
            renders: 0,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn current_width(&self) -> Option<u32> {
        self.current_width
    }

    fn attrs(&self) -> Option<&ResizableImageAttrs> {
        match &self.node.as_ref()?.kind {
            NodeKind::ResizableImage(attrs) => Some(attrs),
            _ => None,
        }
    }

    fn select(&mut self) {
        self.selected = true;
        if self.outside_click.is_none() {
            let mut scope = ListenerScope::new(self.hub.clone());
            scope.listen(EventTarget::Document, EventKind::Click);
            self.outside_click = Some(scope);
        }
    }

    fn deselect(&mut self) {
        self.selected = false;
        self.outside_click = None;
    }

    fn resize_to(&mut self, width: u32) {
        self.current_width = Some(width);
        let Some(attrs) = self.attrs().cloned() else {
            return;
        };
        if let Some(replacer) = &self.replacer {
            replacer.request_replace(NodeKind::ResizableImage(ResizableImageAttrs {
                width: Some(width),
                ..attrs
            }));
        }
    }
}

impl ViewComponent for ResizableImageView {
    fn element(&self) -> ElementId {
        self.element
    }

    fn set_node(&mut self, node: DocumentNode) {
        self.node = Some(node);
        if self.drag.is_none() {
            self.current_width = self.attrs().and_then(|a| a.width);
        }
    }

    fn set_replacer(&mut self, replacer: NodeReplacer) {
        self.replacer = Some(replacer);
    }

    fn detect_changes(&mut self) {
        self.renders += 1;
    }

    fn handle_event(&mut self, event: &ViewEvent) -> bool {
        match event {
            ViewEvent::ImageClick => {
                self.select();
                true
            }
            ViewEvent::DocumentClick { target } => {
                if !self.selected || *target == Some(self.element) {
                    return false;
                }
                self.deselect();
                true
            }
            ViewEvent::ResizeStart {
                pointer_x,
                rendered_width,
            } => {
                self.drag = Some(DragResizeSession::begin(
                    self.hub.clone(),
                    *pointer_x,
                    self.current_width,
                    *rendered_width,
                    self.limits,
                ));
                true
            }
            ViewEvent::PointerMove { x } => {
                let Some(drag) = self.drag.as_mut() else {
                    return false;
                };
                let width = drag.pointer_move(*x);
                self.resize_to(width);
                true
            }
            ViewEvent::PointerUp => match self.drag.take() {
                Some(drag) => {
                    self.current_width = Some(drag.finish());
                    true
                }
                None => false,
            },
            ViewEvent::RemoveImage => self
                .replacer
                .as_ref()
                .is_some_and(|r| r.request_replace(NodeKind::Text(TextBlockKind::Paragraph))),
            ViewEvent::FileSelected(_) => false,
        }
    }

    fn teardown(&mut self) {
        self.drag = None;
        self.outside_click = None;
    }

    fn describe(&self) -> String {
        let src = self.attrs().map(|a| a.src.as_str()).unwrap_or_default();
        let width = self.current_width.unwrap_or(self.limits.min_width);
        let marker = if self.selected { "*" } else { "" };
        format!("[img{marker} {src} width={width}]")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::{Document, DocumentEngine, SharedEngine};
    use crate::listeners::ListenerTable;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Setup {
        doc: Rc<RefCell<Document>>,
        table: Rc<RefCell<ListenerTable>>,
        view: ResizableImageView,
    }

    fn setup(width: u32) -> Setup {
        let doc = Rc::new(RefCell::new(
            Document::builder()
                .node(NodeKind::ResizableImage(ResizableImageAttrs {
                    src: "cat.png".to_string(),
                    width: Some(width),
                    ..Default::default()
                }))
                .build(),
        ));
        let table = Rc::new(RefCell::new(ListenerTable::new()));
        let hub: SharedHub = table.clone();
        let engine: SharedEngine = doc.clone();
        let node = doc.borrow().embedded_nodes()[0].1.clone();

        let mut view = ResizableImageView::new(hub, ResizeLimits::default());
        view.set_replacer(NodeReplacer::new(engine, node.id));
        view.set_node(node);
        Setup { doc, table, view }
    }

    fn stored_width(doc: &Document) -> Option<u32> {
        match &doc.embedded_nodes()[0].1.kind {
            NodeKind::ResizableImage(attrs) => attrs.width,
            _ => None,
        }
    }

    #[test]
    fn test_drag_writes_width_on_every_move() {
        let mut s = setup(400);
        s.view.handle_event(&ViewEvent::ResizeStart {
            pointer_x: 500.0,
            rendered_width: 400.0,
        });
        s.view.handle_event(&ViewEvent::PointerMove { x: 550.0 });
        assert_eq!(stored_width(&s.doc.borrow()), Some(450));

        s.view.handle_event(&ViewEvent::PointerMove { x: 0.0 });
        assert_eq!(stored_width(&s.doc.borrow()), Some(100));
        assert_eq!(s.doc.borrow().version(), 2);

        s.view.handle_event(&ViewEvent::PointerUp);
        assert!(!s.view.is_dragging());
        assert_eq!(s.table.borrow().active_count(), 0);
    }

    #[test]
    fn test_moves_after_pointer_up_are_ignored() {
        let mut s = setup(300);
        s.view.handle_event(&ViewEvent::ResizeStart {
            pointer_x: 0.0,
            rendered_width: 300.0,
        });
        s.view.handle_event(&ViewEvent::PointerUp);
        assert!(!s.view.handle_event(&ViewEvent::PointerMove { x: 200.0 }));
        assert_eq!(stored_width(&s.doc.borrow()), Some(300));
    }

    #[test]
    fn test_click_outside_clears_selection() {
        let mut s = setup(300);
        s.view.handle_event(&ViewEvent::ImageClick);
        assert!(s.view.is_selected());
        assert!(s
            .table
            .borrow()
            .is_listening(EventTarget::Document, EventKind::Click));

        let own = s.view.element();
        assert!(!s.view.handle_event(&ViewEvent::DocumentClick { target: Some(own) }));
        assert!(s.view.is_selected());

        assert!(s.view.handle_event(&ViewEvent::DocumentClick { target: None }));
        assert!(!s.view.is_selected());
        assert_eq!(s.table.borrow().active_count(), 0);
    }

    #[test]
    fn test_remove_image_leaves_a_paragraph() {
        let mut s = setup(300);
        assert!(s.view.handle_event(&ViewEvent::RemoveImage));
        assert!(s.doc.borrow().embedded_nodes().is_empty());
        assert_eq!(s.doc.borrow().text_blocks().len(), 1);
    }

    #[test]
    fn test_teardown_releases_listeners() {
        let mut s = setup(300);
        s.view.handle_event(&ViewEvent::ImageClick);
        s.view.handle_event(&ViewEvent::ResizeStart {
            pointer_x: 0.0,
            rendered_width: 300.0,
        });
        assert_eq!(s.table.borrow().active_count(), 3);
        s.view.teardown();
        assert_eq!(s.table.borrow().active_count(), 0);
    }
}
