//! `/` block commands.

use std::ops::Range;

use super::{SuggestionItem, SuggestionOptions, SuggestionProvider};
use crate::editing::{DocumentEngine, EngineError, Patch, Step, Transaction};
use crate::nodes::{ImageUploadAttrs, NodeKind, TableSpec, TextBlockKind};

pub const SLASH_TRIGGER: char = '/';

/// Table inserted by the `Table` command
pub const SLASH_TABLE: TableSpec = TableSpec {
    rows: 3,
    cols: 3,
    with_header_row: true,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    Heading1,
    Heading2,
    Heading3,
    BulletList,
    NumberedList,
    CodeBlock,
    Quote,
    Table,
    Image,
    Divider,
}

impl SlashCommand {
    pub const ALL: [SlashCommand; 10] = [
        SlashCommand::Heading1,
        SlashCommand::Heading2,
        SlashCommand::Heading3,
        SlashCommand::BulletList,
        SlashCommand::NumberedList,
        SlashCommand::CodeBlock,
        SlashCommand::Quote,
        SlashCommand::Table,
        SlashCommand::Image,
        SlashCommand::Divider,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            SlashCommand::Heading1 => "Heading 1",
            SlashCommand::Heading2 => "Heading 2",
            SlashCommand::Heading3 => "Heading 3",
            SlashCommand::BulletList => "Bullet List",
            SlashCommand::NumberedList => "Numbered List",
            SlashCommand::CodeBlock => "Code Block",
            SlashCommand::Quote => "Quote",
            SlashCommand::Table => "Table",
            SlashCommand::Image => "Image",
            SlashCommand::Divider => "Divider",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SlashCommand::Heading1 => "Large section heading",
            SlashCommand::Heading2 => "Medium section heading",
            SlashCommand::Heading3 => "Small section heading",
            SlashCommand::BulletList => "Create a bullet list",
            SlashCommand::NumberedList => "Create a numbered list",
            SlashCommand::CodeBlock => "Create a code block",
            SlashCommand::Quote => "Create a blockquote",
            SlashCommand::Table => "Insert a table",
            SlashCommand::Image => "Upload an image",
            SlashCommand::Divider => "Insert a horizontal line",
        }
    }

    /// Step run after the trigger and query at `at` were deleted
    fn step(&self, at: usize) -> Step {
        let set = |kind| Step::SetBlockType { at, kind };
        let toggle = |kind| Step::ToggleBlockType { at, kind };
        let insert = |node| Step::ReplaceWith {
            from: at,
            to: at,
            node,
        };
        match self {
            SlashCommand::Heading1 => set(TextBlockKind::Heading(1)),
            SlashCommand::Heading2 => set(TextBlockKind::Heading(2)),
            SlashCommand::Heading3 => set(TextBlockKind::Heading(3)),
            SlashCommand::BulletList => toggle(TextBlockKind::BulletItem),
            SlashCommand::NumberedList => toggle(TextBlockKind::OrderedItem),
            SlashCommand::CodeBlock => toggle(TextBlockKind::CodeBlock),
            SlashCommand::Quote => toggle(TextBlockKind::Blockquote),
            SlashCommand::Table => insert(NodeKind::Table(SLASH_TABLE)),
            SlashCommand::Image => insert(NodeKind::ImageUpload(ImageUploadAttrs::default())),
            SlashCommand::Divider => insert(NodeKind::HorizontalRule),
        }
    }
}

impl SuggestionItem for SlashCommand {
    fn label(&self) -> &str {
        self.title()
    }

    fn detail(&self) -> Option<&str> {
        Some(self.description())
    }
}

pub fn slash_options() -> SuggestionOptions {
    SuggestionOptions {
        trigger: SLASH_TRIGGER,
        start_of_line: true,
        close_on_empty: false,
    }
}

#[derive(Debug, Default)]
pub struct SlashCommandProvider;

impl SuggestionProvider for SlashCommandProvider {
    type Item = SlashCommand;

    fn items(&self, query: &str) -> Vec<SlashCommand> {
        let query = query.to_lowercase();
        SlashCommand::ALL
            .into_iter()
            .filter(|cmd| cmd.title().to_lowercase().contains(&query))
            .collect()
    }

    fn command(
        &self,
        item: &SlashCommand,
        range: Range<usize>,
        engine: &mut dyn DocumentEngine,
    ) -> Result<Patch, EngineError> {
        let at = range.start;
        engine.dispatch(Transaction::new().delete(range).step(item.step(at)))
    }
}
