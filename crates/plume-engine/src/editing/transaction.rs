use std::ops::Range;

use crate::nodes::{Mark, NodeKind, TextAlign, TextBlockKind};

/// Which side of the anchor a row or column is inserted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

/// A single edit. Positions refer to the document as left by the previous
/// step of the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    InsertText {
        at: usize,
        text: String,
    },
    /// Insert text carrying a mark over the whole inserted span
    InsertMarkedText {
        at: usize,
        text: String,
        mark: Mark,
    },
    Delete {
        from: usize,
        to: usize,
    },
    ReplaceText {
        from: usize,
        to: usize,
        text: String,
    },
    /// Replace a range with a node. Inside a text block the block is split
    /// around the node.
    ReplaceWith {
        from: usize,
        to: usize,
        node: NodeKind,
    },
    SetSelection(Range<usize>),
    SetBlockType {
        at: usize,
        kind: TextBlockKind,
    },
    /// Set the block kind, or turn it back into a paragraph if it already
    /// has that kind
    ToggleBlockType {
        at: usize,
        kind: TextBlockKind,
    },
    /// Split the text block at `at` into two blocks
    SplitBlock {
        at: usize,
    },
    /// Insert a row next to the row holding the selection
    AddRow(Side),
    /// Insert a column next to the column holding the selection
    AddColumn(Side),
    /// Toggle a mark over the selection
    ToggleMark(Mark),
    /// Align every paragraph and heading touched by the selection
    SetTextAlign(TextAlign),
}

/// An ordered batch of steps applied atomically
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transaction {
    steps: Vec<Step>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn insert_text(self, at: usize, text: impl Into<String>) -> Self {
        self.step(Step::InsertText {
            at,
            text: text.into(),
        })
    }

    pub fn delete(self, range: Range<usize>) -> Self {
        self.step(Step::Delete {
            from: range.start,
            to: range.end,
        })
    }

    pub fn replace_text(self, range: Range<usize>, text: impl Into<String>) -> Self {
        self.step(Step::ReplaceText {
            from: range.start,
            to: range.end,
            text: text.into(),
        })
    }

    pub fn replace_with(self, from: usize, to: usize, node: NodeKind) -> Self {
        self.step(Step::ReplaceWith { from, to, node })
    }

    pub fn insert_node(self, at: usize, node: NodeKind) -> Self {
        self.replace_with(at, at, node)
    }

    pub fn set_selection(self, range: Range<usize>) -> Self {
        self.step(Step::SetSelection(range))
    }

    pub fn set_cursor(self, at: usize) -> Self {
        self.set_selection(at..at)
    }
}
