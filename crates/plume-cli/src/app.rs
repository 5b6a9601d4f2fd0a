use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use plume_engine::suggestion::SuggestionProps;
use plume_engine::{
    Document, DocumentEngine, DocumentNode, Editor, EditorOptions, Key, KeyPress, Modifiers,
    NodeKind, NodeType, OutlineBlock, Rect, ResizableImageAttrs, TextBlockKind,
};
use ratatui::widgets::ListState;

/// Drawn at the cursor position inside text blocks
pub const CURSOR: char = '▏';

pub struct App {
    editor: Editor,
    pub popup_state: ListState,
}

impl App {
    pub fn new(doc: Document, options: EditorOptions) -> Self {
        let mut app = Self {
            editor: Editor::new(doc, options),
            popup_state: ListState::default(),
        };
        app.sync_caret();
        app
    }

    /// Starting document of the interactive demo
    pub fn demo_document() -> Document {
        Document::builder()
            .heading(1, "Plume")
            .paragraph("Type @ to mention someone, / at the start of a line for commands,")
            .paragraph("or :) <3 ~~~ for shortcuts.")
            .table(&[&["Name", "Role"], &["Ada", "Engineer"]], true)
            .node(NodeKind::ResizableImage(ResizableImageAttrs {
                src: "plume.png".to_string(),
                width: Some(320),
                ..Default::default()
            }))
            .paragraph("")
            .build()
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    /// Handle one key event; returns false when the app should quit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') if ctrl => return false,
            KeyCode::Char('z') if ctrl => {
                self.editor.undo();
            }
            _ => {
                if let Some(press) = to_key_press(key) {
                    self.editor.key_down(&press);
                }
            }
        }
        self.sync_caret();
        true
    }

    pub fn popup(&self) -> Option<SuggestionProps> {
        self.editor.active_suggestion()
    }

    /// Document rendered as plain lines, cursor included
    pub fn document_lines(&self) -> Vec<String> {
        self.render().0
    }

    /// Lines plus the line/column of the cursor
    fn render(&self) -> (Vec<String>, Option<(usize, usize)>) {
        let doc = self.editor.document();
        let cursor = doc.selection().end;
        let mut lines = Vec::new();
        let mut caret = None;

        for block in doc.outline() {
            match block {
                OutlineBlock::Text { pos, kind, text } => {
                    let prefix = block_prefix(kind);
                    let offset = cursor.checked_sub(pos + 1).filter(|o| *o <= text.len());
                    match offset.filter(|o| text.is_char_boundary(*o)) {
                        Some(offset) => {
                            let before = &text[..offset];
                            caret = Some((lines.len(), prefix.chars().count() + before.chars().count()));
                            lines.push(format!("{prefix}{before}{CURSOR}{}", &text[offset..]));
                        }
                        None => lines.push(format!("{prefix}{text}")),
                    }
                }
                OutlineBlock::Node { node, .. } => lines.push(self.describe_node(&node)),
                OutlineBlock::Table { cells, .. } => {
                    for row in cells {
                        lines.push(format!("| {} |", row.join(" | ")));
                    }
                }
            }
        }
        (lines, caret)
    }

    fn describe_node(&self, node: &DocumentNode) -> String {
        if let Some(binding) = self.editor.registry().binding(node.id) {
            return binding.component().describe();
        }
        match node.node_type() {
            NodeType::HorizontalRule => "─".repeat(20),
            other => format!("[{}]", other.name()),
        }
    }

    /// Anchor suggestion popups at the cursor's line and column
    fn sync_caret(&mut self) {
        let (_, caret) = self.render();
        if let Some((line, col)) = caret {
            self.editor
                .set_caret_rect(Rect::new(col as f64, line as f64, 1.0, 1.0));
        }
        self.popup_state
            .select(self.popup().map(|props| props.selected_index));
    }
}

fn block_prefix(kind: TextBlockKind) -> String {
    match kind {
        TextBlockKind::Paragraph => String::new(),
        TextBlockKind::Heading(level) => format!("{} ", "#".repeat(level as usize)),
        TextBlockKind::CodeBlock => "    ".to_string(),
        TextBlockKind::Blockquote => "> ".to_string(),
        TextBlockKind::BulletItem => "• ".to_string(),
        TextBlockKind::OrderedItem => "1. ".to_string(),
    }
}

fn to_key_press(event: KeyEvent) -> Option<KeyPress> {
    let key = match event.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Escape,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Tab => Key::Tab,
        KeyCode::Up => Key::ArrowUp,
        KeyCode::Down => Key::ArrowDown,
        KeyCode::Left => Key::ArrowLeft,
        KeyCode::Right => Key::ArrowRight,
        _ => return None,
    };
    let modifiers = Modifiers {
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
        meta: event.modifiers.contains(KeyModifiers::SUPER),
        shift: event.modifiers.contains(KeyModifiers::SHIFT),
        alt: event.modifiers.contains(KeyModifiers::ALT),
    };
    // Shifted characters arrive already shifted
    let modifiers = match key {
        Key::Char(_) if !modifiers.is_mod() && !modifiers.alt => Modifiers::NONE,
        _ => modifiers,
    };
    Some(KeyPress::with(key, modifiers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn press(app: &mut App, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn empty_app() -> App {
        App::new(Document::new(), EditorOptions::default())
    }

    #[test]
    fn test_typing_renders_with_cursor() {
        let mut app = empty_app();
        type_str(&mut app, "hey");
        assert_eq!(app.document_lines(), vec![format!("hey{CURSOR}")]);

        press(&mut app, KeyCode::Left);
        assert_eq!(app.document_lines(), vec![format!("he{CURSOR}y")]);
    }

    #[test]
    fn test_ctrl_q_quits() {
        let mut app = empty_app();
        assert!(press(&mut app, KeyCode::Char('x')));
        assert!(!app.handle_key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL)));
    }

    #[test]
    fn test_ctrl_z_undoes_typing() {
        let mut app = empty_app();
        type_str(&mut app, "ab");
        app.handle_key(KeyEvent::new(KeyCode::Char('z'), KeyModifiers::CONTROL));
        assert_eq!(app.document_lines(), vec![format!("a{CURSOR}")]);
    }

    #[test]
    fn test_slash_popup_tracks_selection() {
        let mut app = empty_app();
        type_str(&mut app, "/");
        assert_eq!(app.popup_state.selected(), Some(0));

        press(&mut app, KeyCode::Down);
        assert_eq!(app.popup_state.selected(), Some(1));
        assert_eq!(
            app.popup().map(|p| p.items[1].label.clone()).as_deref(),
            Some("Heading 2")
        );

        press(&mut app, KeyCode::Enter);
        assert!(app.popup().is_none());
        assert_eq!(app.popup_state.selected(), None);
        assert_eq!(app.document_lines(), vec![format!("## {CURSOR}")]);
    }

    #[test]
    fn test_popup_anchor_follows_cursor_line() {
        let mut app = empty_app();
        type_str(&mut app, "hi @");
        let anchor = app.popup().map(|p| p.anchor);
        assert_eq!(anchor, Some(Rect::new(4.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_demo_document_renders_every_block() {
        let app = App::new(App::demo_document(), EditorOptions::default());
        let lines = app.document_lines();
        assert_eq!(lines[0], "# Plume");
        assert!(lines.contains(&"| Name | Role |".to_string()));
        assert!(lines.contains(&"[img plume.png width=320]".to_string()));
        assert_eq!(lines.last(), Some(&CURSOR.to_string()));
    }
}
