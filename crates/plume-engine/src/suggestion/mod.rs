/*!
 * # Suggestion Engine
 *
 * Detects a trigger character typed at a valid position, asks a provider for
 * matching items and drives a keyboard-navigable popup until the user
 * commits an item or cancels.
 *
 * ```text
 * Idle --trigger typed--> Open --Enter--> Committed --> Idle
 *                          |  \--Escape / cursor leaves--> Cancelled --> Idle
 *                          \-- text changed: recompute query, refresh items
 * ```
 *
 * The engine owns the session state (range, query, items, selection). The
 * host supplies a [`SuggestionRenderer`] for the list and a
 * [`PopupPositioner`] that floats it next to the caret.
 *
 * - **`mentions`**: `@` user mentions
 * - **`slash`**: `/` block commands
 * - **`popup`**: in-memory renderer and positioner used by terminal hosts
 */

pub mod mentions;
pub mod popup;
pub mod slash;

use std::ops::Range;

use crate::editing::{DocumentEngine, EngineError, Patch};
use crate::geometry::Rect;
use crate::keys::{Key, KeyPress};
use crate::nodes::ElementId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionOptions {
    pub trigger: char,
    /// Only open when the trigger is the first character of the block
    pub start_of_line: bool,
    /// Close instead of showing an empty list when nothing matches
    pub close_on_empty: bool,
}

impl SuggestionOptions {
    pub fn new(trigger: char) -> Self {
        Self {
            trigger,
            start_of_line: false,
            close_on_empty: false,
        }
    }
}

/// Trigger plus query found before the cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionMatch {
    /// From the trigger to the cursor
    pub range: Range<usize>,
    pub query: String,
}

/// Look for an active trigger in the text block holding the cursor.
///
/// The trigger must start the block or follow whitespace, and the query
/// after it may not contain whitespace.
pub fn find_suggestion_match(
    engine: &dyn DocumentEngine,
    options: &SuggestionOptions,
) -> Option<SuggestionMatch> {
    let selection = engine.selection();
    if !selection.is_empty() {
        return None;
    }
    let cursor = selection.start;
    let block = engine.textblock_range(cursor)?;
    let text = engine.text_between(block.start, cursor);

    let at = text.rfind(options.trigger)?;
    if options.start_of_line && at != 0 {
        return None;
    }
    if let Some(prev) = text[..at].chars().next_back()
        && !prev.is_whitespace()
    {
        return None;
    }
    let query = &text[at + options.trigger.len_utf8()..];
    if query.chars().any(char::is_whitespace) {
        return None;
    }

    Some(SuggestionMatch {
        range: block.start + at..cursor,
        query: query.to_string(),
    })
}

pub trait SuggestionItem {
    fn label(&self) -> &str;

    fn detail(&self) -> Option<&str> {
        None
    }
}

/// Source of items and the action run when one is committed
pub trait SuggestionProvider {
    type Item: SuggestionItem + Clone;

    fn items(&self, query: &str) -> Vec<Self::Item>;

    /// Replace `range` (trigger and query) with the item's content. Must
    /// dispatch a single transaction.
    fn command(
        &self,
        item: &Self::Item,
        range: Range<usize>,
        engine: &mut dyn DocumentEngine,
    ) -> Result<Patch, EngineError>;

    /// Shown by the renderer when no item matches
    fn empty_message(&self) -> &'static str {
        "No results"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionEntry {
    pub label: String,
    pub detail: Option<String>,
}

/// Snapshot of an open session handed to the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionProps {
    pub trigger: char,
    pub query: String,
    pub range: Range<usize>,
    pub items: Vec<SuggestionEntry>,
    pub selected_index: usize,
    pub empty_message: &'static str,
    /// Caret rectangle the popup hangs from
    pub anchor: Rect,
}

/// Host component rendering the item list
pub trait SuggestionRenderer {
    /// Create the list and return its root element
    fn on_open(&mut self, props: &SuggestionProps) -> ElementId;
    fn on_update(&mut self, props: &SuggestionProps);
    /// Return true to take over handling of the key
    fn on_key_down(&mut self, _key: &KeyPress, _props: &SuggestionProps) -> bool {
        false
    }
    fn on_close(&mut self);
}

/// A floating element placed relative to an anchor rectangle
pub trait PopupHandle {
    fn update(&mut self, anchor: Rect);
    fn destroy(&mut self);
}

pub trait PopupPositioner {
    fn position(&mut self, anchor: Rect, content: ElementId) -> Box<dyn PopupHandle>;
}

fn entries<I: SuggestionItem>(items: &[I]) -> Vec<SuggestionEntry> {
    items
        .iter()
        .map(|item| SuggestionEntry {
            label: item.label().to_string(),
            detail: item.detail().map(str::to_string),
        })
        .collect()
}

struct SuggestionSession<I> {
    range: Range<usize>,
    query: String,
    items: Vec<I>,
    selected_index: usize,
    anchor: Rect,
    popup: Box<dyn PopupHandle>,
}

/// One suggestion plugin: options, provider and the live session
pub struct Suggestion<P: SuggestionProvider> {
    options: SuggestionOptions,
    provider: P,
    renderer: Box<dyn SuggestionRenderer>,
    positioner: Box<dyn PopupPositioner>,
    session: Option<SuggestionSession<P::Item>>,
    /// Trigger position cancelled with Escape; not reopened until the
    /// cursor leaves it
    dismissed: Option<usize>,
}

impl<P: SuggestionProvider> Suggestion<P> {
    pub fn new(
        options: SuggestionOptions,
        provider: P,
        renderer: Box<dyn SuggestionRenderer>,
        positioner: Box<dyn PopupPositioner>,
    ) -> Self {
        Self {
            options,
            provider,
            renderer,
            positioner,
            session: None,
            dismissed: None,
        }
    }

    pub fn options(&self) -> &SuggestionOptions {
        &self.options
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn items(&self) -> &[P::Item] {
        self.session.as_ref().map(|s| s.items.as_slice()).unwrap_or(&[])
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.selected_index)
    }

    pub fn query(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.query.as_str())
    }

    pub fn range(&self) -> Option<Range<usize>> {
        self.session.as_ref().map(|s| s.range.clone())
    }

    fn props_of(&self, session: &SuggestionSession<P::Item>) -> SuggestionProps {
        SuggestionProps {
            trigger: self.options.trigger,
            query: session.query.clone(),
            range: session.range.clone(),
            items: entries(&session.items),
            selected_index: session.selected_index,
            empty_message: self.provider.empty_message(),
            anchor: session.anchor,
        }
    }

    /// Re-evaluate the session after the document or selection changed
    pub fn refresh(&mut self, engine: &dyn DocumentEngine, anchor: Rect) {
        let found = find_suggestion_match(engine, &self.options);

        let found = match (found, self.dismissed) {
            (Some(m), Some(pos)) if m.range.start == pos => None,
            (found, _) => {
                self.dismissed = None;
                found
            }
        };

        let Some(found) = found else {
            self.close();
            return;
        };

        let items = self.provider.items(&found.query);
        if items.is_empty() && self.options.close_on_empty {
            self.close();
            return;
        }

        match self.session.take() {
            Some(mut session) => {
                if session.query != found.query || session.range.start != found.range.start {
                    session.selected_index = 0;
                }
                session.range = found.range;
                session.query = found.query;
                session.items = items;
                session.anchor = anchor;
                session.popup.update(anchor);
                let props = self.props_of(&session);
                self.renderer.on_update(&props);
                self.session = Some(session);
            }
            None => {
                log::debug!(
                    "suggestion '{}' opened at {:?}",
                    self.options.trigger,
                    found.range
                );
                let props = SuggestionProps {
                    trigger: self.options.trigger,
                    query: found.query.clone(),
                    range: found.range.clone(),
                    items: entries(&items),
                    selected_index: 0,
                    empty_message: self.provider.empty_message(),
                    anchor,
                };
                let element = self.renderer.on_open(&props);
                let popup = self.positioner.position(anchor, element);
                self.session = Some(SuggestionSession {
                    range: found.range,
                    query: found.query,
                    items,
                    selected_index: 0,
                    anchor,
                    popup,
                });
            }
        }
    }

    /// Handle a key while the popup is open. Returns true when consumed.
    pub fn key_down(&mut self, engine: &mut dyn DocumentEngine, key: &KeyPress) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        let props = self.props_of(session);
        if self.renderer.on_key_down(key, &props) {
            return true;
        }

        match key.key {
            Key::ArrowUp | Key::ArrowDown => {
                if let Some(session) = self.session.as_mut() {
                    let n = session.items.len();
                    if n > 0 {
                        let i = session.selected_index;
                        session.selected_index = if key.key == Key::ArrowUp {
                            (i + n - 1) % n
                        } else {
                            (i + 1) % n
                        };
                    }
                }
                if let Some(session) = self.session.as_ref() {
                    let props = self.props_of(session);
                    self.renderer.on_update(&props);
                }
                true
            }
            Key::Enter => {
                self.commit(engine);
                true
            }
            Key::Escape => {
                self.dismissed = self.session.as_ref().map(|s| s.range.start);
                self.close();
                true
            }
            _ => false,
        }
    }

    fn commit(&mut self, engine: &mut dyn DocumentEngine) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(item) = session.items.get(session.selected_index).cloned() else {
            return;
        };
        let range = session.range.clone();
        self.close();
        if let Err(err) = self.provider.command(&item, range, engine) {
            log::warn!("suggestion command for '{}' failed: {err}", item.label());
        }
    }

    /// Tear down the popup without touching the document
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.popup.destroy();
            self.renderer.on_close();
            log::debug!("suggestion '{}' closed", self.options.trigger);
        }
    }
}

/// Object-safe view of a [`Suggestion`], so hosts can hold plugins with
/// different providers side by side
pub trait SuggestionPlugin {
    fn refresh(&mut self, engine: &dyn DocumentEngine, anchor: Rect);
    fn key_down(&mut self, engine: &mut dyn DocumentEngine, key: &KeyPress) -> bool;
    fn is_open(&self) -> bool;
    fn close(&mut self);
    fn props(&self) -> Option<SuggestionProps>;
}

impl<P: SuggestionProvider> SuggestionPlugin for Suggestion<P> {
    fn refresh(&mut self, engine: &dyn DocumentEngine, anchor: Rect) {
        Suggestion::refresh(self, engine, anchor);
    }

    fn key_down(&mut self, engine: &mut dyn DocumentEngine, key: &KeyPress) -> bool {
        Suggestion::key_down(self, engine, key)
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn close(&mut self) {
        Suggestion::close(self);
    }

    fn props(&self) -> Option<SuggestionProps> {
        self.session.as_ref().map(|s| self.props_of(s))
    }
}

#[cfg(test)]
mod tests {
    use super::popup::{ListRenderer, PopupLayer, PopupState};
    use super::*;
    use crate::editing::{Document, Transaction};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    struct Word(&'static str);

    impl SuggestionItem for Word {
        fn label(&self) -> &str {
            self.0
        }
    }

    struct Words(Vec<&'static str>);

    impl SuggestionProvider for Words {
        type Item = Word;

        fn items(&self, query: &str) -> Vec<Word> {
            let query = query.to_lowercase();
            self.0
                .iter()
                .filter(|w| w.to_lowercase().contains(&query))
                .map(|w| Word(w))
                .collect()
        }

        fn command(
            &self,
            item: &Word,
            range: Range<usize>,
            engine: &mut dyn DocumentEngine,
        ) -> Result<Patch, EngineError> {
            engine.dispatch(Transaction::new().replace_text(range, item.0))
        }
    }

    struct Harness {
        doc: Document,
        plugin: Suggestion<Words>,
        state: Rc<RefCell<PopupState>>,
        layer: Rc<RefCell<PopupLayer>>,
    }

    fn harness(text: &str, options: SuggestionOptions, words: Vec<&'static str>) -> Harness {
        let state = Rc::new(RefCell::new(PopupState::default()));
        let layer = Rc::new(RefCell::new(PopupLayer::default()));
        let plugin = Suggestion::new(
            options,
            Words(words),
            Box::new(ListRenderer::new(state.clone())),
            Box::new(PopupLayer::positioner(layer.clone())),
        );
        Harness {
            doc: Document::from_text(text),
            plugin,
            state,
            layer,
        }
    }

    fn anchor() -> Rect {
        Rect::new(10.0, 20.0, 1.0, 16.0)
    }

    impl Harness {
        fn type_text(&mut self, text: &str) {
            let at = self.doc.selection().start;
            self.doc
                .dispatch(Transaction::new().insert_text(at, text))
                .unwrap();
            self.plugin.refresh(&self.doc, anchor());
        }

        fn press(&mut self, key: Key) -> bool {
            let consumed = self.plugin.key_down(&mut self.doc, &KeyPress::plain(key));
            self.plugin.refresh(&self.doc, anchor());
            consumed
        }
    }

    #[rstest]
    #[case("", 1, Some(""))]
    #[case("hello ", 7, Some(""))]
    #[case("a b", 3, Some(""))]
    #[case("hello", 6, None)]
    fn test_trigger_position(#[case] text: &str, #[case] cursor: usize, #[case] query: Option<&str>) {
        let mut doc = Document::from_text(text);
        doc.dispatch(Transaction::new().insert_text(cursor, "/")).unwrap();
        let found = find_suggestion_match(&doc, &SuggestionOptions::new('/'));
        assert_eq!(found.map(|m| m.query), query.map(str::to_string));
    }

    #[test]
    fn test_start_of_line_requires_block_start() {
        let mut options = SuggestionOptions::new('/');
        options.start_of_line = true;
        let doc = Document::from_text("/head");
        assert_eq!(
            find_suggestion_match(&doc, &options),
            Some(SuggestionMatch {
                range: 1..6,
                query: "head".to_string()
            })
        );
        let doc = Document::from_text("text /head");
        assert_eq!(find_suggestion_match(&doc, &options), None);
    }

    #[test]
    fn test_whitespace_in_query_ends_match() {
        let doc = Document::from_text("@ali ce");
        assert_eq!(find_suggestion_match(&doc, &SuggestionOptions::new('@')), None);
    }

    #[test]
    fn test_filter_preserves_order() {
        let mut h = harness("", SuggestionOptions::new('/'), vec!["Heading 1", "Heading 2", "Table"]);
        h.type_text("/He");
        let labels: Vec<String> = h
            .state
            .borrow()
            .props
            .iter()
            .flat_map(|p| p.items.iter().map(|i| i.label.clone()))
            .collect();
        assert_eq!(labels, vec!["Heading 1", "Heading 2"]);
    }

    #[test]
    fn test_navigation_is_cyclic() {
        let mut h = harness("", SuggestionOptions::new('/'), vec!["a1", "a2", "a3"]);
        h.type_text("/a");
        for _ in 0..3 {
            assert!(h.press(Key::ArrowDown));
        }
        assert_eq!(h.plugin.selected_index(), Some(0));
        h.press(Key::ArrowUp);
        assert_eq!(h.plugin.selected_index(), Some(2));
    }

    #[test]
    fn test_query_change_resets_selection() {
        let mut h = harness("", SuggestionOptions::new('/'), vec!["ab", "ac", "ad"]);
        h.type_text("/a");
        h.press(Key::ArrowDown);
        assert_eq!(h.plugin.selected_index(), Some(1));
        h.type_text("c");
        assert_eq!(h.plugin.selected_index(), Some(0));
    }

    #[test]
    fn test_enter_commits_in_one_transaction() {
        let mut h = harness("", SuggestionOptions::new('/'), vec!["Heading 1", "Heading 2"]);
        h.type_text("/He");
        h.press(Key::ArrowDown);
        let version = h.doc.version();
        assert!(h.press(Key::Enter));

        assert_eq!(h.doc.version(), version + 1);
        assert_eq!(h.doc.text_between(0, h.doc.size()), "Heading 2");
        assert!(!h.plugin.is_open());
        assert!(!h.state.borrow().open);
        assert_eq!(h.layer.borrow().live_count(), 0);
    }

    #[test]
    fn test_empty_list_keys_are_consumed_without_effect() {
        let mut h = harness("", SuggestionOptions::new('/'), vec!["Table"]);
        h.type_text("/zz");
        assert!(h.plugin.is_open());
        assert_eq!(h.state.borrow().props.as_ref().map(|p| p.items.len()), Some(0));

        let version = h.doc.version();
        assert!(h.press(Key::ArrowDown));
        assert!(h.press(Key::Enter));
        assert_eq!(h.doc.version(), version);
        assert!(h.plugin.is_open());
    }

    #[test]
    fn test_close_on_empty() {
        let mut options = SuggestionOptions::new('/');
        options.close_on_empty = true;
        let mut h = harness("", options, vec!["Table"]);
        h.type_text("/t");
        assert!(h.plugin.is_open());
        h.type_text("z");
        assert!(!h.plugin.is_open());
    }

    #[test]
    fn test_escape_cancels_until_cursor_leaves() {
        let mut h = harness("", SuggestionOptions::new('@'), vec!["alice"]);
        h.type_text("@al");
        assert!(h.press(Key::Escape));
        assert!(!h.plugin.is_open());

        // still inside the dismissed trigger
        h.type_text("i");
        assert!(!h.plugin.is_open());

        h.type_text(" @a");
        assert!(h.plugin.is_open());
        assert_eq!(h.doc.version(), 3);
    }

    #[test]
    fn test_cursor_leaving_range_cancels() {
        let mut h = harness("", SuggestionOptions::new('/'), vec!["Table"]);
        h.type_text("/t");
        h.doc.set_cursor(1).unwrap();
        h.plugin.refresh(&h.doc, anchor());
        assert!(!h.plugin.is_open());
        assert_eq!(h.layer.borrow().live_count(), 0);
    }

    #[test]
    fn test_popup_follows_anchor() {
        let mut h = harness("", SuggestionOptions::new('/'), vec!["Table"]);
        h.type_text("/");
        let moved = Rect::new(40.0, 60.0, 1.0, 16.0);
        let at = h.doc.selection().start;
        h.doc.dispatch(Transaction::new().insert_text(at, "t")).unwrap();
        h.plugin.refresh(&h.doc, moved);

        let element = h.state.borrow().element;
        let placed = element.and_then(|e| h.layer.borrow().position_of(e));
        assert_eq!(placed.map(|p| (p.x, p.y)), Some((40.0, 76.0)));
    }

    #[test]
    fn test_unrelated_keys_pass_through() {
        let mut h = harness("", SuggestionOptions::new('/'), vec!["Table"]);
        h.type_text("/");
        assert!(!h.press(Key::Char('x')));
        assert!(!h.press(Key::Tab));
        assert!(h.plugin.is_open());
    }
}
