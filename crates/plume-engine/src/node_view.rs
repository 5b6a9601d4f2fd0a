/*!
 * # Embedded-View Bridge
 *
 * Lets externally rendered UI components act as live views of document
 * nodes. Each [`NodeViewBinding`] ties one node to one component:
 *
 * - **`mount`**: register the component with the rendering root
 * - **`update`**: push a new node into the component if the type matches
 * - **`destroy`**: detach and tear down; safe to call more than once
 *
 * Components never mutate the engine directly. They receive a
 * [`NodeReplacer`] that swaps the bound node at its *current* position for a
 * new node in one transaction.
 *
 * [`NodeViewRegistry`] keeps bindings in step with the engine: one factory
 * per custom node type, at most one binding per node identity.
 */

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::editing::SharedEngine;
use crate::nodes::{DocumentNode, ElementId, NodeId, NodeKind, NodeType};

/// A file picked in an upload view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub mime: String,
    pub data_url: String,
}

/// UI events delivered to view components
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    ImageClick,
    /// A click anywhere in the document; `target` is the clicked view root,
    /// if the click landed on one
    DocumentClick { target: Option<ElementId> },
    /// Pointer-down on a resize handle
    ResizeStart { pointer_x: f64, rendered_width: f64 },
    PointerMove { x: f64 },
    PointerUp,
    RemoveImage,
    FileSelected(UploadedFile),
}

/// A UI fragment rendering one node
pub trait ViewComponent: Any {
    /// Root element of the fragment
    fn element(&self) -> ElementId;

    fn set_node(&mut self, node: DocumentNode);

    fn set_replacer(&mut self, replacer: NodeReplacer);

    /// Re-render after the node or local state changed
    fn detect_changes(&mut self);

    /// Returns true when the event was handled
    fn handle_event(&mut self, event: &ViewEvent) -> bool;

    /// Release listeners and sessions before the fragment is discarded
    fn teardown(&mut self) {}

    /// One-line text rendering for terminal hosts
    fn describe(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

/// The host's rendering root (`ApplicationRef`)
pub trait RenderRoot {
    fn attach(&mut self, element: ElementId, node: NodeId);
    fn detach(&mut self, element: ElementId);
    fn mark_dirty(&mut self, element: ElementId);
}

pub type SharedRoot = Rc<RefCell<dyn RenderRoot>>;

/// In-memory [`RenderRoot`] recording attached views and pending re-renders
#[derive(Debug, Default)]
pub struct AttachedViews {
    attached: HashMap<ElementId, NodeId>,
    dirty: HashSet<ElementId>,
}

impl AttachedViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self, element: ElementId) -> bool {
        self.attached.contains_key(&element)
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    pub fn take_dirty(&mut self) -> Vec<ElementId> {
        self.dirty.drain().collect()
    }
}

impl RenderRoot for AttachedViews {
    fn attach(&mut self, element: ElementId, node: NodeId) {
        self.attached.insert(element, node);
        self.dirty.insert(element);
    }

    fn detach(&mut self, element: ElementId) {
        self.attached.remove(&element);
        self.dirty.remove(&element);
    }

    fn mark_dirty(&mut self, element: ElementId) {
        if self.attached.contains_key(&element) {
            self.dirty.insert(element);
        }
    }
}

/// Side channel for a component to replace the node it renders
#[derive(Clone)]
pub struct NodeReplacer {
    engine: SharedEngine,
    node: NodeId,
}

impl NodeReplacer {
    pub fn new(engine: SharedEngine, node: NodeId) -> Self {
        Self { engine, node }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Replace the bound node, spanning its current size, with `kind`.
    ///
    /// Silently skipped when the node is no longer in the document or the
    /// engine is busy.
    pub fn request_replace(&self, kind: NodeKind) -> bool {
        let Ok(mut engine) = self.engine.try_borrow_mut() else {
            log::debug!("engine busy, skipping replacement of {:?}", self.node);
            return false;
        };
        let Some((pos, node)) = engine.find_node(self.node) else {
            log::debug!("node {:?} is gone, skipping replacement", self.node);
            return false;
        };
        match engine.replace_range(pos, pos + node.size(), kind) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("replacing node {:?} failed: {err}", self.node);
                false
            }
        }
    }
}

pub struct NodeViewBinding {
    node: DocumentNode,
    component: Box<dyn ViewComponent>,
    root: SharedRoot,
    mounted: Option<ElementId>,
}

impl NodeViewBinding {
    pub fn new(
        node: DocumentNode,
        mut component: Box<dyn ViewComponent>,
        root: SharedRoot,
        replacer: NodeReplacer,
    ) -> Self {
        component.set_node(node.clone());
        component.set_replacer(replacer);
        Self {
            node,
            component,
            root,
            mounted: None,
        }
    }

    /// Attach the component to the rendering root and return its element
    pub fn mount(&mut self) -> Option<ElementId> {
        if let Some(element) = self.mounted {
            return Some(element);
        }
        let element = self.component.element();
        let Ok(mut root) = self.root.try_borrow_mut() else {
            log::warn!("render root busy, cannot mount view for {:?}", self.node.id);
            return None;
        };
        root.attach(element, self.node.id);
        drop(root);
        self.component.detect_changes();
        self.mounted = Some(element);
        Some(element)
    }

    /// Push `node` into the component. Returns false when the node type
    /// differs; the caller must then destroy this binding and mount a new one.
    pub fn update(&mut self, node: &DocumentNode) -> bool {
        if node.node_type() != self.node.node_type() {
            return false;
        }
        self.node = node.clone();
        self.component.set_node(node.clone());
        self.component.detect_changes();
        if let (Some(element), Ok(mut root)) = (self.mounted, self.root.try_borrow_mut()) {
            root.mark_dirty(element);
        }
        true
    }

    pub fn destroy(&mut self) {
        let Some(element) = self.mounted.take() else {
            return;
        };
        if let Ok(mut root) = self.root.try_borrow_mut() {
            root.detach(element);
        }
        self.component.teardown();
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn node(&self) -> &DocumentNode {
        &self.node
    }

    pub fn component(&self) -> &dyn ViewComponent {
        self.component.as_ref()
    }

    pub fn handle_event(&mut self, event: &ViewEvent) -> bool {
        let handled = self.component.handle_event(event);
        if handled
            && let (Some(element), Ok(mut root)) = (self.mounted, self.root.try_borrow_mut())
        {
            root.mark_dirty(element);
        }
        handled
    }
}

impl Drop for NodeViewBinding {
    fn drop(&mut self) {
        self.destroy();
    }
}

pub type ViewFactory = Box<dyn Fn() -> Box<dyn ViewComponent>>;

/// What a [`NodeViewRegistry::sync`] pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub mounted: usize,
    pub updated: usize,
    pub remounted: usize,
    pub destroyed: usize,
}

pub struct NodeViewRegistry {
    engine: SharedEngine,
    root: SharedRoot,
    factories: HashMap<NodeType, ViewFactory>,
    bindings: HashMap<NodeId, NodeViewBinding>,
}

impl NodeViewRegistry {
    pub fn new(engine: SharedEngine, root: SharedRoot) -> Self {
        Self {
            engine,
            root,
            factories: HashMap::new(),
            bindings: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        node_type: NodeType,
        factory: impl Fn() -> Box<dyn ViewComponent> + 'static,
    ) {
        self.factories.insert(node_type, Box::new(factory));
    }

    pub fn has_view_for(&self, node_type: NodeType) -> bool {
        self.factories.contains_key(&node_type)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Mirror the engine's embedded nodes: mount new ones, update changed
    /// ones, remount on type change and destroy views whose node is gone.
    pub fn sync(&mut self) -> SyncReport {
        let mut report = SyncReport::default();
        let nodes: Vec<DocumentNode> = match self.engine.try_borrow() {
            Ok(engine) => engine
                .embedded_nodes()
                .into_iter()
                .map(|(_, node)| node)
                .filter(|node| self.has_view_for(node.node_type()))
                .collect(),
            Err(_) => {
                log::warn!("engine busy, node views not synced");
                return report;
            }
        };

        let live: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
        let stale: Vec<NodeId> = self
            .bindings
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for id in stale {
            if let Some(mut binding) = self.bindings.remove(&id) {
                binding.destroy();
                report.destroyed += 1;
            }
        }

        for node in nodes {
            match self.bindings.get_mut(&node.id) {
                Some(binding) if binding.node() == &node => {}
                Some(binding) => {
                    if binding.update(&node) {
                        report.updated += 1;
                    } else {
                        log::debug!("node {:?} changed type, remounting view", node.id);
                        if let Some(mut old) = self.bindings.remove(&node.id) {
                            old.destroy();
                        }
                        if let Some(binding) = self.create(node) {
                            self.bindings.insert(binding.node().id, binding);
                            report.remounted += 1;
                        }
                    }
                }
                None => {
                    if let Some(binding) = self.create(node) {
                        self.bindings.insert(binding.node().id, binding);
                        report.mounted += 1;
                    }
                }
            }
        }
        report
    }

    fn create(&self, node: DocumentNode) -> Option<NodeViewBinding> {
        let factory = self.factories.get(&node.node_type())?;
        let replacer = NodeReplacer::new(self.engine.clone(), node.id);
        let mut binding = NodeViewBinding::new(node, factory(), self.root.clone(), replacer);
        binding.mount()?;
        Some(binding)
    }

    /// Deliver an event to the view of one node
    pub fn dispatch(&mut self, node: NodeId, event: &ViewEvent) -> bool {
        self.bindings
            .get_mut(&node)
            .is_some_and(|binding| binding.handle_event(event))
    }

    /// Deliver a document-level event to every view
    pub fn broadcast(&mut self, event: &ViewEvent) -> bool {
        let mut handled = false;
        for binding in self.bindings.values_mut() {
            handled |= binding.handle_event(event);
        }
        handled
    }

    pub fn binding(&self, node: NodeId) -> Option<&NodeViewBinding> {
        self.bindings.get(&node)
    }

    /// Typed access to the component rendering `node`
    pub fn view<T: ViewComponent>(&self, node: NodeId) -> Option<&T> {
        self.bindings
            .get(&node)?
            .component()
            .as_any()
            .downcast_ref::<T>()
    }

    /// Element id of each mounted view, keyed by node
    pub fn elements(&self) -> Vec<(NodeId, ElementId)> {
        self.bindings
            .iter()
            .filter_map(|(id, b)| b.mounted.map(|el| (*id, el)))
            .collect()
    }

    pub fn destroy_all(&mut self) {
        for (_, mut binding) in self.bindings.drain() {
            binding.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::{Document, DocumentEngine};
    use crate::nodes::{ImageUploadAttrs, ResizableImageAttrs};
    use pretty_assertions::assert_eq;

    /// Records what the bridge asked of it
    #[derive(Default)]
    struct Probe {
        element: ElementId,
        node: Option<DocumentNode>,
        replacer: Option<NodeReplacer>,
        renders: usize,
        torn_down: Rc<RefCell<usize>>,
    }

    impl ViewComponent for Probe {
        fn element(&self) -> ElementId {
            self.element
        }
        fn set_node(&mut self, node: DocumentNode) {
            self.node = Some(node);
        }
        fn set_replacer(&mut self, replacer: NodeReplacer) {
            self.replacer = Some(replacer);
        }
        fn detect_changes(&mut self) {
            self.renders += 1;
        }
        fn handle_event(&mut self, event: &ViewEvent) -> bool {
            match (event, &self.replacer) {
                (ViewEvent::RemoveImage, Some(r)) => {
                    r.request_replace(NodeKind::Text(crate::nodes::TextBlockKind::Paragraph))
                }
                _ => false,
            }
        }
        fn teardown(&mut self) {
            *self.torn_down.borrow_mut() += 1;
        }
        fn describe(&self) -> String {
            "probe".to_string()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn image(width: u32) -> NodeKind {
        NodeKind::ResizableImage(ResizableImageAttrs {
            src: "a.png".to_string(),
            width: Some(width),
            ..Default::default()
        })
    }

    struct Fixture {
        doc: Rc<RefCell<Document>>,
        root: Rc<RefCell<AttachedViews>>,
        registry: NodeViewRegistry,
        torn_down: Rc<RefCell<usize>>,
    }

    fn fixture(doc: Document) -> Fixture {
        let doc = Rc::new(RefCell::new(doc));
        let root = Rc::new(RefCell::new(AttachedViews::new()));
        let engine: SharedEngine = doc.clone();
        let shared_root: SharedRoot = root.clone();
        let mut registry = NodeViewRegistry::new(engine, shared_root);
        let torn_down = Rc::new(RefCell::new(0));
        for ty in [NodeType::ResizableImage, NodeType::ImageUpload] {
            let counter = torn_down.clone();
            registry.register(ty, move || {
                Box::new(Probe {
                    torn_down: counter.clone(),
                    ..Default::default()
                })
            });
        }
        Fixture {
            doc,
            root,
            registry,
            torn_down,
        }
    }

    #[test]
    fn test_sync_mounts_one_view_per_node() {
        let mut f = fixture(
            Document::builder()
                .node(image(100))
                .node(NodeKind::HorizontalRule)
                .node(image(200))
                .build(),
        );
        let report = f.registry.sync();
        assert_eq!(report.mounted, 2);
        assert_eq!(f.root.borrow().attached_count(), 2);

        // a second pass is a no-op
        assert_eq!(f.registry.sync(), SyncReport::default());
    }

    #[test]
    fn test_same_type_replacement_updates_in_place() {
        let mut f = fixture(Document::builder().node(image(100)).build());
        f.registry.sync();
        let id = f.doc.borrow().embedded_nodes()[0].1.id;
        let element = f.registry.binding(id).map(|b| b.component().element());

        f.doc.borrow_mut().replace_range(0, 1, image(300)).unwrap();
        let report = f.registry.sync();

        assert_eq!(report.updated, 1);
        let probe = f.registry.view::<Probe>(id).unwrap();
        assert_eq!(probe.node.as_ref().map(|n| n.kind.clone()), Some(image(300)));
        assert_eq!(probe.renders, 2);
        assert_eq!(Some(probe.element), element);
    }

    #[test]
    fn test_type_change_remounts() {
        let mut f = fixture(
            Document::builder()
                .node(NodeKind::ImageUpload(ImageUploadAttrs::default()))
                .build(),
        );
        f.registry.sync();
        f.doc.borrow_mut().replace_range(0, 1, image(100)).unwrap();

        let report = f.registry.sync();
        assert_eq!(report.remounted, 1);
        assert_eq!(*f.torn_down.borrow(), 1);
        assert_eq!(f.root.borrow().attached_count(), 1);
    }

    #[test]
    fn test_replacer_swaps_node_at_current_position() {
        let mut f = fixture(
            Document::builder()
                .paragraph("intro")
                .node(image(100))
                .build(),
        );
        f.registry.sync();
        let id = f.doc.borrow().embedded_nodes()[0].1.id;

        // text typed before the node moves it
        f.doc
            .borrow_mut()
            .dispatch(crate::editing::Transaction::new().insert_text(1, "longer "))
            .unwrap();
        assert!(f.registry.dispatch(id, &ViewEvent::RemoveImage));

        assert!(f.doc.borrow().embedded_nodes().is_empty());
        assert_eq!(f.registry.sync().destroyed, 1);
        assert_eq!(f.root.borrow().attached_count(), 0);
    }

    #[test]
    fn test_replacer_skips_removed_node() {
        let f = fixture(Document::builder().node(image(100)).build());
        let id = f.doc.borrow().embedded_nodes()[0].1.id;
        let engine: SharedEngine = f.doc.clone();
        let replacer = NodeReplacer::new(engine, id);

        f.doc
            .borrow_mut()
            .replace_range(0, 1, NodeKind::HorizontalRule)
            .unwrap();
        // the rule kept the leaf identity, so remove it entirely
        f.doc
            .borrow_mut()
            .dispatch(crate::editing::Transaction::new().delete(0..1))
            .unwrap();

        let version = f.doc.borrow().version();
        assert!(!replacer.request_replace(image(500)));
        assert_eq!(f.doc.borrow().version(), version);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let f = fixture(Document::builder().node(image(100)).build());
        let node = f.doc.borrow().embedded_nodes()[0].1.clone();
        let engine: SharedEngine = f.doc.clone();
        let root: SharedRoot = f.root.clone();
        let mut binding = NodeViewBinding::new(
            node.clone(),
            Box::new(Probe {
                torn_down: f.torn_down.clone(),
                ..Default::default()
            }),
            root,
            NodeReplacer::new(engine, node.id),
        );
        binding.mount();
        binding.destroy();
        binding.destroy();
        drop(binding);
        assert_eq!(*f.torn_down.borrow(), 1);
        assert_eq!(f.root.borrow().attached_count(), 0);
    }
}
