/*!
 * # Editor Host
 *
 * Wires one shared [`Document`] with every extension: input rules, the
 * mention and slash-command suggestion plugins, node views, table hover
 * assistants and keyboard shortcuts. Hosts feed it keystrokes and pointer
 * events; it keeps views and popups in step with the document after every
 * change.
 *
 * Key routing order: an open suggestion popup, then shortcuts, then the
 * built-in editing keys.
 */

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::commands::{self, Command};
use crate::editing::{Document, DocumentEngine, EngineEvent, SharedEngine, Step, Transaction};
use crate::geometry::{InsertTarget, Point, Rect};
use crate::input_rules::InputRules;
use crate::keys::{Key, KeyPress};
use crate::listeners::{EventKind, EventTarget, ListenerTable, SharedHub};
use crate::node_view::{AttachedViews, NodeViewRegistry, SharedRoot, SyncReport, ViewEvent};
use crate::nodes::{ElementId, NodeId};
use crate::resize::ResizeLimits;
use crate::suggestion::mentions::{MentionItem, MentionProvider, demo_users, mention_options};
use crate::suggestion::popup::{ListRenderer, PopupLayer, PopupState};
use crate::suggestion::slash::{SlashCommandProvider, slash_options};
use crate::suggestion::{Suggestion, SuggestionOptions, SuggestionPlugin, SuggestionProps};
use crate::table::{
    AffordanceLayer, Hovered, PointerTarget, SharedAffordanceHost, TableGeometry,
    TableHoverAssistant,
};
use crate::views;

/// Everything configurable about an [`Editor`]
#[derive(Debug, Clone, PartialEq)]
pub struct EditorOptions {
    pub mentions: SuggestionOptions,
    pub slash: SuggestionOptions,
    pub users: Vec<MentionItem>,
    pub limits: ResizeLimits,
    pub emoji: bool,
    pub spaghetto: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            mentions: mention_options(),
            slash: slash_options(),
            users: demo_users(),
            limits: ResizeLimits::default(),
            emoji: true,
            spaghetto: true,
        }
    }
}

pub struct Editor {
    doc: Rc<RefCell<Document>>,
    engine: SharedEngine,
    listeners: Rc<RefCell<ListenerTable>>,
    root: Rc<RefCell<AttachedViews>>,
    affordances: Rc<RefCell<AffordanceLayer>>,
    popups: Rc<RefCell<PopupLayer>>,
    registry: NodeViewRegistry,
    rules: InputRules,
    suggestions: Vec<Box<dyn SuggestionPlugin>>,
    tables: HashMap<NodeId, TableHoverAssistant>,
    caret: Rect,
}

impl Editor {
    pub fn new(doc: Document, options: EditorOptions) -> Self {
        let doc = Rc::new(RefCell::new(doc));
        let engine: SharedEngine = doc.clone();
        let listeners = Rc::new(RefCell::new(ListenerTable::new()));
        let hub: SharedHub = listeners.clone();
        let root = Rc::new(RefCell::new(AttachedViews::new()));
        let shared_root: SharedRoot = root.clone();
        let popups = Rc::new(RefCell::new(PopupLayer::default()));

        let mut registry = NodeViewRegistry::new(engine.clone(), shared_root);
        views::register_defaults(&mut registry, hub, options.limits);

        let mut rules = InputRules::new();
        if options.emoji {
            rules = rules.with_emoji();
        }
        if options.spaghetto {
            rules = rules.with_node_rules();
        }

        let renderer = || Box::new(ListRenderer::new(Rc::new(RefCell::new(PopupState::default()))));
        let suggestions: Vec<Box<dyn SuggestionPlugin>> = vec![
            Box::new(Suggestion::new(
                options.mentions,
                MentionProvider::new(options.users),
                renderer(),
                Box::new(PopupLayer::positioner(popups.clone())),
            )),
            Box::new(Suggestion::new(
                options.slash,
                SlashCommandProvider,
                renderer(),
                Box::new(PopupLayer::positioner(popups.clone())),
            )),
        ];

        let mut editor = Self {
            doc,
            engine,
            listeners,
            root,
            affordances: Rc::new(RefCell::new(AffordanceLayer::new())),
            popups,
            registry,
            rules,
            suggestions,
            tables: HashMap::new(),
            caret: Rect::default(),
        };
        editor.sync_views();
        editor
    }

    pub fn document(&self) -> Ref<'_, Document> {
        self.doc.borrow()
    }

    pub fn shared(&self) -> SharedEngine {
        self.engine.clone()
    }

    pub fn listeners(&self) -> Ref<'_, ListenerTable> {
        self.listeners.borrow()
    }

    pub fn attached_views(&self) -> Ref<'_, AttachedViews> {
        self.root.borrow()
    }

    pub fn affordances(&self) -> Ref<'_, AffordanceLayer> {
        self.affordances.borrow()
    }

    pub fn popups(&self) -> Ref<'_, PopupLayer> {
        self.popups.borrow()
    }

    pub fn registry(&self) -> &NodeViewRegistry {
        &self.registry
    }

    pub fn to_html(&self) -> String {
        self.doc.borrow().to_html()
    }

    /// Caret rectangle used to anchor suggestion popups
    pub fn set_caret_rect(&mut self, caret: Rect) {
        self.caret = caret;
        self.refresh_suggestions();
    }

    /// The open suggestion popup, if any
    pub fn active_suggestion(&self) -> Option<SuggestionProps> {
        self.suggestions.iter().find_map(|s| s.props())
    }

    /// Type text at the selection, one character at a time, letting input
    /// rules rewrite each keystroke.
    ///
    /// A rule whose rewrite the engine rejects falls back to inserting the
    /// typed character as-is.
    pub fn type_text(&mut self, text: &str) {
        for c in text.chars() {
            let typed = c.to_string();
            let result = {
                let mut doc = self.doc.borrow_mut();
                let sel = doc.selection();
                let rewritten = self
                    .rules
                    .handle_text_input(&*doc, sel.start, sel.end, &typed)
                    .map(|tr| doc.dispatch(tr));
                match rewritten {
                    Some(Ok(patch)) => Ok(patch),
                    Some(Err(err)) => {
                        log::debug!("input rule for {c:?} rejected: {err}");
                        doc.dispatch(Transaction::new().replace_text(sel, typed))
                    }
                    None => doc.dispatch(Transaction::new().replace_text(sel, typed)),
                }
            };
            if let Err(err) = result {
                log::warn!("typing {c:?} rejected: {err}");
            }
            self.after_change();
        }
    }

    /// Route a key press. Returns true when something consumed it.
    pub fn key_down(&mut self, press: &KeyPress) -> bool {
        let consumed = {
            let mut doc = self.doc.borrow_mut();
            self.suggestions
                .iter_mut()
                .filter(|s| s.is_open())
                .any(|s| s.key_down(&mut *doc, press))
        };
        if consumed {
            self.after_change();
            return true;
        }

        if let Some(cmd) = Command::for_shortcut(press) {
            return self.run(&cmd);
        }

        let modified = press.modifiers.is_mod() || press.modifiers.alt;
        let handled = match press.key {
            Key::Char(c) if !modified => {
                self.type_text(&c.to_string());
                return true;
            }
            Key::Enter => self.split_block(),
            Key::Backspace => self.backspace(),
            Key::ArrowLeft => self.move_cursor(false),
            Key::ArrowRight => self.move_cursor(true),
            _ => false,
        };
        if handled {
            self.after_change();
        }
        handled
    }

    pub fn run(&mut self, cmd: &Command) -> bool {
        let result = commands::run(&mut *self.doc.borrow_mut(), cmd);
        match result {
            Ok(_) => {
                self.after_change();
                true
            }
            Err(err) => {
                log::warn!("command {cmd:?} failed: {err}");
                false
            }
        }
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.doc.borrow_mut().undo();
        if undone {
            self.after_change();
        }
        undone
    }

    pub fn set_cursor(&mut self, pos: usize) -> bool {
        let moved = self.doc.borrow_mut().set_cursor(pos).is_ok();
        self.after_change();
        moved
    }

    fn split_block(&mut self) -> bool {
        let mut doc = self.doc.borrow_mut();
        let sel = doc.selection();
        let tr = Transaction::new()
            .delete(sel.clone())
            .step(Step::SplitBlock { at: sel.start });
        doc.dispatch(tr).is_ok()
    }

    fn backspace(&mut self) -> bool {
        let mut doc = self.doc.borrow_mut();
        let sel = doc.selection();
        if !sel.is_empty() {
            return doc.dispatch(Transaction::new().delete(sel)).is_ok();
        }
        let Some(block) = doc.textblock_range(sel.start) else {
            return false;
        };
        let before = doc.text_between(block.start, sel.start);
        let Some(prev) = before.chars().next_back() else {
            return false;
        };
        let from = sel.start - prev.len_utf8();
        doc.dispatch(Transaction::new().delete(from..sel.start)).is_ok()
    }

    /// Step one character, hopping to the neighbouring text block at edges
    fn move_cursor(&mut self, forward: bool) -> bool {
        let mut doc = self.doc.borrow_mut();
        let pos = doc.selection().end;
        let Some(block) = doc.textblock_range(pos) else {
            return false;
        };
        let target = if forward && pos < block.end {
            let next = doc.text_between(pos, block.end);
            next.chars().next().map(|c| pos + c.len_utf8())
        } else if !forward && pos > block.start {
            let prev = doc.text_between(block.start, pos);
            prev.chars().next_back().map(|c| pos - c.len_utf8())
        } else if forward {
            (pos + 1..=doc.size()).find(|p| doc.textblock_range(*p).is_some())
        } else {
            (0..pos).rev().find(|p| doc.textblock_range(*p).is_some())
        };
        target.is_some_and(|t| doc.set_cursor(t).is_ok())
    }

    /// Deliver an event to the view of one node
    pub fn view_event(&mut self, node: NodeId, event: &ViewEvent) -> bool {
        let handled = self.registry.dispatch(node, event);
        self.after_change();
        handled
    }

    /// Whether any live session listens for `kind` on `target`. Events
    /// nobody listens for are dropped before they reach views or assistants.
    fn listening(&self, target: EventTarget, kind: EventKind) -> bool {
        self.listeners
            .try_borrow()
            .is_ok_and(|table| table.is_listening(target, kind))
    }

    /// A click somewhere in the document, possibly on a view root
    pub fn document_click(&mut self, target: Option<ElementId>) -> bool {
        if !self.listening(EventTarget::Document, EventKind::Click) {
            return false;
        }
        self.registry
            .broadcast(&ViewEvent::DocumentClick { target })
    }

    /// Pointer moves and releases during a drag reach the views only while
    /// a drag session listens for them
    pub fn pointer_move(&mut self, x: f64) -> bool {
        if !self.listening(EventTarget::Document, EventKind::PointerMove) {
            return false;
        }
        let handled = self.registry.broadcast(&ViewEvent::PointerMove { x });
        self.after_change();
        handled
    }

    pub fn pointer_up(&mut self) -> bool {
        if !self.listening(EventTarget::Document, EventKind::PointerUp) {
            return false;
        }
        let handled = self.registry.broadcast(&ViewEvent::PointerUp);
        self.after_change();
        handled
    }

    pub fn table_pointer_move(
        &mut self,
        geometry: &TableGeometry,
        target: PointerTarget,
        pointer: Point,
    ) -> Option<InsertTarget> {
        if !self.listening(EventTarget::Table(geometry.table), EventKind::PointerMove) {
            return None;
        }
        self.tables
            .get_mut(&geometry.table)?
            .on_table_pointer_move(geometry, target, pointer)
    }

    pub fn document_pointer_move(&mut self, hovered: Hovered) {
        if !self.listening(EventTarget::Document, EventKind::PointerMove) {
            return;
        }
        for assistant in self.tables.values_mut() {
            assistant.on_document_pointer_move(hovered);
        }
    }

    pub fn table_scroll(&mut self, table: NodeId) {
        if !self.listening(EventTarget::TableScroller(table), EventKind::Scroll) {
            return;
        }
        if let Some(assistant) = self.tables.get_mut(&table) {
            assistant.on_table_scroll();
        }
    }

    pub fn document_scroll(&mut self) {
        if !self.listening(EventTarget::Document, EventKind::Scroll) {
            return;
        }
        for assistant in self.tables.values_mut() {
            assistant.on_document_scroll();
        }
    }

    pub fn affordance_click(&mut self, geometry: &TableGeometry) -> bool {
        let Some(assistant) = self.tables.get_mut(&geometry.table) else {
            return false;
        };
        let inserted = assistant.on_affordance_click(geometry);
        self.after_change();
        inserted
    }

    pub fn hover_target(&self, table: NodeId) -> Option<InsertTarget> {
        self.tables.get(&table)?.current_target()
    }

    /// Affordance element currently shown for `table`
    pub fn affordance(&self, table: NodeId) -> Option<ElementId> {
        self.tables.get(&table)?.affordance()
    }

    /// Mount, update and destroy node views and table assistants to match
    /// the document
    pub fn sync_views(&mut self) -> SyncReport {
        let report = self.registry.sync();

        let tables: Vec<NodeId> = self.doc.borrow().tables().iter().map(|t| t.id).collect();
        self.tables.retain(|id, _| tables.contains(id));
        for id in tables {
            if !self.tables.contains_key(&id) {
                let affordances: SharedAffordanceHost = self.affordances.clone();
                let assistant = TableHoverAssistant::attach(
                    id,
                    self.engine.clone(),
                    self.listeners.clone(),
                    affordances,
                );
                self.tables.insert(id, assistant);
            }
        }
        report
    }

    fn refresh_suggestions(&mut self) {
        let doc = self.doc.borrow();
        for plugin in self.suggestions.iter_mut() {
            plugin.refresh(&*doc, self.caret);
        }
    }

    /// Drain engine notifications and bring views and popups up to date
    fn after_change(&mut self) {
        let events = self.doc.borrow_mut().take_events();
        let changed = events
            .iter()
            .any(|e| matches!(e, EngineEvent::DocumentChanged { .. }));
        if changed {
            let report = self.sync_views();
            log::debug!("document changed, views synced: {report:?}");
        }
        if !events.is_empty() {
            self.refresh_suggestions();
        }
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        for plugin in self.suggestions.iter_mut() {
            plugin.close();
        }
        self.tables.clear();
        self.registry.destroy_all();
    }
}
