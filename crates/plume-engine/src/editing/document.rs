use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;

use xi_rope::Rope;

use crate::editing::marks::{self, MarkSpan};
use crate::editing::{
    DocumentEngine, ElementRef, EngineError, EngineEvent, Patch, Side, Step, Transaction,
};
use crate::nodes::{
    DocumentNode, Mark, NodeId, NodeKind, TableSpec, TextAlign, TextBlockKind,
};

/// A block holding inline text, stored in an xi-rope buffer
#[derive(Clone)]
pub(crate) struct TextBlock {
    pub(crate) id: NodeId,
    pub(crate) kind: TextBlockKind,
    pub(crate) align: TextAlign,
    pub(crate) text: Rope,
    pub(crate) marks: Vec<MarkSpan>,
}

impl TextBlock {
    fn new(kind: TextBlockKind) -> Self {
        Self::with_text(kind, "")
    }

    fn with_text(kind: TextBlockKind, text: &str) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            align: TextAlign::default(),
            text: Rope::from(text),
            marks: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.text.len()
    }

    pub(crate) fn size(&self) -> usize {
        self.len() + 2
    }

    pub(crate) fn content(&self) -> String {
        self.text.to_string()
    }

    /// Split into the text before `at` and a new block holding the rest
    fn split_off(&mut self, at: usize, kind: TextBlockKind) -> TextBlock {
        let content = self.content();
        let mut tail = TextBlock::with_text(kind, &content[at..]);
        tail.align = self.align;
        tail.marks = self
            .marks
            .iter()
            .filter(|s| s.range.end > at)
            .map(|s| MarkSpan {
                range: s.range.start.max(at) - at..s.range.end - at,
                mark: s.mark.clone(),
            })
            .collect();

        self.text = Rope::from(&content[..at]);
        self.marks.retain(|s| s.range.start < at);
        for span in self.marks.iter_mut() {
            span.range.end = span.range.end.min(at);
        }
        tail
    }
}

impl fmt::Debug for TextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextBlock")
            .field("kind", &self.kind)
            .field("align", &self.align)
            .field("text", &self.content())
            .field("marks", &self.marks)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct TableCell {
    pub(crate) header: bool,
    pub(crate) paragraph: TextBlock,
}

impl TableCell {
    fn empty(header: bool) -> Self {
        Self {
            header,
            paragraph: TextBlock::new(TextBlockKind::Paragraph),
        }
    }

    fn size(&self) -> usize {
        self.paragraph.size() + 2
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Table {
    pub(crate) id: NodeId,
    pub(crate) rows: Vec<Vec<TableCell>>,
}

impl Table {
    fn from_spec(spec: &TableSpec) -> Self {
        let rows = (0..spec.rows)
            .map(|r| {
                (0..spec.cols)
                    .map(|_| TableCell::empty(spec.with_header_row && r == 0))
                    .collect()
            })
            .collect();
        Self {
            id: NodeId::new(),
            rows,
        }
    }

    fn size(&self) -> usize {
        2 + self
            .rows
            .iter()
            .map(|row| 2 + row.iter().map(TableCell::size).sum::<usize>())
            .sum::<usize>()
    }

    fn col_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    fn row_is_header(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .is_some_and(|cells| !cells.is_empty() && cells.iter().all(|c| c.header))
    }

    fn column_is_header(&self, col: usize) -> bool {
        !self.rows.is_empty()
            && self
                .rows
                .iter()
                .all(|cells| cells.get(col).is_some_and(|c| c.header))
    }

    /// Cell type for column `col` of a row inserted at index `at`: copied from
    /// the row above, or from the row below when the row above is a header
    /// row. A row added above or below a header row at the table edge is a
    /// plain row.
    fn new_row_cell_is_header(&self, at: usize, col: usize) -> bool {
        let reference = at.saturating_sub(1);
        let source = if self.row_is_header(reference) {
            if at == 0 || at == self.rows.len() {
                return false;
            }
            at
        } else {
            reference
        };
        self.rows
            .get(source)
            .and_then(|cells| cells.get(col))
            .is_some_and(|c| c.header)
    }

    /// Same rule as [`Self::new_row_cell_is_header`], applied to columns
    fn new_column_cell_is_header(&self, at: usize, row: usize) -> bool {
        let reference = at.saturating_sub(1);
        let source = if self.column_is_header(reference) {
            if at == 0 || at == self.col_count() {
                return false;
            }
            at
        } else {
            reference
        };
        self.rows
            .get(row)
            .and_then(|cells| cells.get(source))
            .is_some_and(|c| c.header)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Block {
    Text(TextBlock),
    Leaf(DocumentNode),
    Table(Table),
}

impl Block {
    pub(crate) fn size(&self) -> usize {
        match self {
            Block::Text(tb) => tb.size(),
            Block::Leaf(_) => 1,
            Block::Table(table) => table.size(),
        }
    }

    fn from_kind(kind: NodeKind, id: Option<NodeId>) -> Self {
        match kind {
            NodeKind::Text(kind) => Block::Text(TextBlock::new(kind)),
            NodeKind::Table(spec) => Block::Table(Table::from_spec(&spec)),
            kind => Block::Leaf(DocumentNode {
                id: id.unwrap_or_default(),
                kind,
            }),
        }
    }
}

/// Location of a text block: top level or inside a table cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotPath {
    Block(usize),
    Cell {
        block: usize,
        row: usize,
        col: usize,
    },
}

/// Content span of one text block
#[derive(Debug, Clone, Copy)]
struct TextSlot {
    path: SlotPath,
    start: usize,
    len: usize,
}

impl TextSlot {
    fn end(&self) -> usize {
        self.start + self.len
    }

    fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos <= self.end()
    }
}

/// Position and shape of a table in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableInfo {
    pub id: NodeId,
    pub pos: usize,
    pub rows: usize,
    pub cols: usize,
}

/// A top-level block as seen by hosts that render the document as text
#[derive(Debug, Clone, PartialEq)]
pub enum OutlineBlock {
    Text {
        pos: usize,
        kind: TextBlockKind,
        text: String,
    },
    Node {
        pos: usize,
        node: DocumentNode,
    },
    Table {
        pos: usize,
        id: NodeId,
        cells: Vec<Vec<String>>,
    },
}

#[derive(Clone, Debug)]
struct DocState {
    blocks: Vec<Block>,
    selection: Range<usize>,
}

impl DocState {
    fn size(&self) -> usize {
        self.blocks.iter().map(Block::size).sum()
    }

    fn block_starts(&self) -> Vec<usize> {
        let mut pos = 0;
        self.blocks
            .iter()
            .map(|b| {
                let start = pos;
                pos += b.size();
                start
            })
            .collect()
    }

    fn slots(&self) -> Vec<TextSlot> {
        let mut out = Vec::new();
        let mut pos = 0;
        for (i, block) in self.blocks.iter().enumerate() {
            match block {
                Block::Text(tb) => out.push(TextSlot {
                    path: SlotPath::Block(i),
                    start: pos + 1,
                    len: tb.len(),
                }),
                Block::Table(table) => {
                    let mut p = pos + 1;
                    for (r, row) in table.rows.iter().enumerate() {
                        p += 1;
                        for (c, cell) in row.iter().enumerate() {
                            out.push(TextSlot {
                                path: SlotPath::Cell {
                                    block: i,
                                    row: r,
                                    col: c,
                                },
                                start: p + 2,
                                len: cell.paragraph.len(),
                            });
                            p += cell.size();
                        }
                        p += 1;
                    }
                }
                Block::Leaf(_) => {}
            }
            pos += block.size();
        }
        out
    }

    fn slot_at(&self, pos: usize) -> Option<TextSlot> {
        self.slots().into_iter().find(|s| s.contains(pos))
    }

    fn slot_for(&self, path: SlotPath) -> Option<TextSlot> {
        self.slots().into_iter().find(|s| s.path == path)
    }

    fn text_block(&self, path: SlotPath) -> Option<&TextBlock> {
        match (path, self.blocks.get(path_block(path))?) {
            (SlotPath::Block(_), Block::Text(tb)) => Some(tb),
            (SlotPath::Cell { row, col, .. }, Block::Table(t)) => {
                t.rows.get(row)?.get(col).map(|c| &c.paragraph)
            }
            _ => None,
        }
    }

    fn text_block_mut(&mut self, path: SlotPath) -> Option<&mut TextBlock> {
        match (path, self.blocks.get_mut(path_block(path))?) {
            (SlotPath::Block(_), Block::Text(tb)) => Some(tb),
            (SlotPath::Cell { row, col, .. }, Block::Table(t)) => {
                t.rows.get_mut(row)?.get_mut(col).map(|c| &mut c.paragraph)
            }
            _ => None,
        }
    }

    fn map_selection(&mut self, f: impl Fn(usize) -> usize) {
        self.selection = f(self.selection.start)..f(self.selection.end);
    }

    /// Index range of top-level blocks exactly spanning `from..to`
    fn whole_blocks(&self, from: usize, to: usize) -> Option<Range<usize>> {
        let starts = self.block_starts();
        let first = starts.iter().position(|&s| s == from)?;
        let mut end = from;
        for (i, block) in self.blocks.iter().enumerate().skip(first) {
            end += block.size();
            if end == to {
                return Some(first..i + 1);
            }
            if end > to {
                return None;
            }
        }
        None
    }

    /// Apply one step; returns whether document content changed
    fn apply(&mut self, step: &Step, changed: &mut Vec<Range<usize>>) -> Result<bool, EngineError> {
        match step {
            Step::InsertText { at, text } => {
                self.insert_text(*at, text, None, changed)?;
                Ok(!text.is_empty())
            }
            Step::InsertMarkedText { at, text, mark } => {
                self.insert_text(*at, text, Some(mark.clone()), changed)?;
                Ok(!text.is_empty())
            }
            Step::Delete { from, to } => self.delete(*from, *to, changed),
            Step::ReplaceText { from, to, text } => {
                let deleted = self.delete(*from, *to, changed)?;
                self.insert_text(*from, text, None, changed)?;
                Ok(deleted || !text.is_empty())
            }
            Step::ReplaceWith { from, to, node } => {
                self.replace_with(*from, *to, node.clone(), changed)?;
                Ok(true)
            }
            Step::SetSelection(range) => {
                let size = self.size();
                if range.start > range.end || range.end > size {
                    return Err(EngineError::OutOfRange {
                        pos: range.end,
                        size,
                    });
                }
                self.selection = range.clone();
                Ok(false)
            }
            Step::SetBlockType { at, kind } => {
                let slot = self.slot_at(*at).ok_or(EngineError::NotInTextBlock(*at))?;
                self.set_kind(slot, *kind);
                Ok(true)
            }
            Step::ToggleBlockType { at, kind } => {
                let slot = self.slot_at(*at).ok_or(EngineError::NotInTextBlock(*at))?;
                let current = self.text_block(slot.path).map(|tb| tb.kind);
                let next = if current == Some(*kind) {
                    TextBlockKind::Paragraph
                } else {
                    *kind
                };
                self.set_kind(slot, next);
                Ok(true)
            }
            Step::SplitBlock { at } => {
                self.split_block(*at, changed)?;
                Ok(true)
            }
            Step::AddRow(side) => {
                self.add_row(*side)?;
                Ok(true)
            }
            Step::AddColumn(side) => {
                self.add_column(*side)?;
                Ok(true)
            }
            Step::ToggleMark(mark) => Ok(self.toggle_mark(mark)),
            Step::SetTextAlign(align) => Ok(self.set_text_align(*align)),
        }
    }

    fn insert_text(
        &mut self,
        at: usize,
        text: &str,
        mark: Option<Mark>,
        changed: &mut Vec<Range<usize>>,
    ) -> Result<(), EngineError> {
        if text.is_empty() {
            return Ok(());
        }
        let slot = self.slot_at(at).ok_or(EngineError::NotInTextBlock(at))?;
        let local = at - slot.start;
        let tb = self
            .text_block_mut(slot.path)
            .ok_or(EngineError::NotInTextBlock(at))?;
        if !tb.content().is_char_boundary(local) {
            return Err(EngineError::InvalidReplace {
                from: at,
                to: at,
                reason: "not a character boundary",
            });
        }

        let len = text.len();
        tb.text.edit(local..local, text);
        marks::shift_for_insert(&mut tb.marks, local, len);
        if let Some(mark) = mark {
            marks::add_mark(&mut tb.marks, local..local + len, mark);
        }

        self.map_selection(|x| if x >= at { x + len } else { x });
        changed.push(at..at + len);
        Ok(())
    }

    fn delete(
        &mut self,
        from: usize,
        to: usize,
        changed: &mut Vec<Range<usize>>,
    ) -> Result<bool, EngineError> {
        if from > to {
            return Err(EngineError::InvalidReplace {
                from,
                to,
                reason: "inverted range",
            });
        }
        if from == to {
            return Ok(false);
        }
        let size = self.size();
        if to > size {
            return Err(EngineError::OutOfRange { pos: to, size });
        }

        let len = to - from;
        if let Some(slot) = self.slot_at(from).filter(|s| s.contains(to)) {
            let (lf, lt) = (from - slot.start, to - slot.start);
            let tb = self
                .text_block_mut(slot.path)
                .ok_or(EngineError::NotInTextBlock(from))?;
            tb.text.edit(lf..lt, "");
            marks::shift_for_delete(&mut tb.marks, lf..lt);
        } else if let Some(indices) = self.whole_blocks(from, to) {
            self.blocks.drain(indices);
            if self.blocks.is_empty() {
                self.blocks
                    .push(Block::Text(TextBlock::new(TextBlockKind::Paragraph)));
            }
        } else {
            return Err(EngineError::InvalidReplace {
                from,
                to,
                reason: "range crosses block boundaries",
            });
        }

        self.map_selection(|x| {
            if x <= from {
                x
            } else if x >= to {
                x - len
            } else {
                from
            }
        });
        changed.push(from..from);
        Ok(true)
    }

    fn replace_with(
        &mut self,
        from: usize,
        to: usize,
        node: NodeKind,
        changed: &mut Vec<Range<usize>>,
    ) -> Result<(), EngineError> {
        let size = self.size();
        if from > to || to > size {
            return Err(EngineError::OutOfRange { pos: to, size });
        }
        let new_size = node.size();

        // Whole top-level blocks: swap them out. A single leaf replaced by a
        // leaf keeps its identity so a live node view can be reused.
        if from < to
            && let Some(indices) = self.whole_blocks(from, to)
        {
            let keep_id = match &self.blocks[indices.start] {
                Block::Leaf(old) if indices.len() == 1 && node.is_leaf() => Some(old.id),
                _ => None,
            };
            let index = indices.start;
            self.blocks.drain(indices);
            self.blocks.insert(index, Block::from_kind(node, keep_id));
            self.map_selection(|x| {
                if x < from {
                    x
                } else if x >= to {
                    x - (to - from) + new_size
                } else {
                    from
                }
            });
            changed.push(from..from + new_size);
            return Ok(());
        }

        // Empty range on a block boundary: plain insertion
        if from == to {
            let starts = self.block_starts();
            let index = if from == size {
                Some(self.blocks.len())
            } else {
                starts.iter().position(|&s| s == from)
            };
            if let Some(index) = index {
                self.blocks.insert(index, Block::from_kind(node, None));
                self.map_selection(|x| if x >= from { x + new_size } else { x });
                changed.push(from..from + new_size);
                return Ok(());
            }
        }

        // Inside a top-level text block: split it around the new node
        let slot = self
            .slot_at(from)
            .filter(|s| s.contains(to))
            .ok_or(EngineError::InvalidReplace {
                from,
                to,
                reason: "range crosses block boundaries",
            })?;
        let SlotPath::Block(index) = slot.path else {
            return Err(EngineError::InvalidReplace {
                from,
                to,
                reason: "blocks cannot be placed inside a table cell",
            });
        };
        let Some(Block::Text(mut head)) = self.blocks.get(index).cloned() else {
            return Err(EngineError::NotInTextBlock(from));
        };

        let (lf, lt) = (from - slot.start, to - slot.start);
        let content = head.content();
        if !content.is_char_boundary(lf) || !content.is_char_boundary(lt) {
            return Err(EngineError::InvalidReplace {
                from,
                to,
                reason: "not a character boundary",
            });
        }
        let kind = head.kind;
        let mut tail = head.split_off(lt, kind);
        let head_len = head.len();
        head.text.edit(lf..head_len, "");
        marks::shift_for_delete(&mut head.marks, lf..lt);

        let is_last = index + 1 == self.blocks.len();
        let next_is_text = matches!(self.blocks.get(index + 1), Some(Block::Text(_)));
        let keep_head = head.len() > 0;
        let keep_tail = tail.len() > 0 || is_last;
        if !keep_head {
            tail.id = head.id;
        }

        let block_start = self.block_starts()[index];
        let mut replacement = Vec::new();
        let mut node_start = block_start;
        if keep_head {
            node_start += head.size();
            replacement.push(Block::Text(head));
        }
        replacement.push(Block::from_kind(node, None));
        if keep_tail {
            replacement.push(Block::Text(tail));
        }
        self.blocks.splice(index..index + 1, replacement);

        let after_node = node_start + new_size;
        let cursor = if keep_tail || next_is_text {
            after_node + 1
        } else {
            after_node
        };
        self.selection = cursor..cursor;
        changed.push(node_start..after_node);
        Ok(())
    }

    fn set_kind(&mut self, slot: TextSlot, kind: TextBlockKind) {
        if let Some(tb) = self.text_block_mut(slot.path) {
            tb.kind = kind;
        }
    }

    fn split_block(&mut self, at: usize, changed: &mut Vec<Range<usize>>) -> Result<(), EngineError> {
        let slot = self.slot_at(at).ok_or(EngineError::NotInTextBlock(at))?;
        let SlotPath::Block(index) = slot.path else {
            return Err(EngineError::InvalidReplace {
                from: at,
                to: at,
                reason: "table cells hold a single paragraph",
            });
        };
        let local = at - slot.start;
        let Some(Block::Text(head)) = self.blocks.get_mut(index) else {
            return Err(EngineError::NotInTextBlock(at));
        };
        if !head.content().is_char_boundary(local) {
            return Err(EngineError::InvalidReplace {
                from: at,
                to: at,
                reason: "not a character boundary",
            });
        }
        let kind = match head.kind {
            TextBlockKind::Heading(_) if local == head.len() => TextBlockKind::Paragraph,
            kind => kind,
        };
        let tail = head.split_off(local, kind);
        self.blocks.insert(index + 1, Block::Text(tail));
        self.map_selection(|x| if x >= at { x + 2 } else { x });
        changed.push(at..at + 2);
        Ok(())
    }

    /// Cell path and local offset of the selection head
    fn selected_cell(&self) -> Result<(usize, usize, usize, usize), EngineError> {
        let head = self.selection.start;
        match self.slot_at(head) {
            Some(TextSlot {
                path: SlotPath::Cell { block, row, col },
                start,
                ..
            }) => Ok((block, row, col, head - start)),
            _ => Err(EngineError::NotInTable),
        }
    }

    fn restore_cell_selection(&mut self, path: SlotPath, local: usize) {
        if let Some(slot) = self.slot_for(path) {
            let pos = slot.start + local.min(slot.len);
            self.selection = pos..pos;
        }
    }

    fn add_row(&mut self, side: Side) -> Result<(), EngineError> {
        let (block, row, col, local) = self.selected_cell()?;
        let Some(Block::Table(table)) = self.blocks.get_mut(block) else {
            return Err(EngineError::NotInTable);
        };
        let (at, selected_row) = match side {
            Side::Before => (row, row + 1),
            Side::After => (row + 1, row),
        };
        let new_row: Vec<TableCell> = (0..table.rows[row].len())
            .map(|c| TableCell::empty(table.new_row_cell_is_header(at, c)))
            .collect();
        table.rows.insert(at, new_row);
        self.restore_cell_selection(
            SlotPath::Cell {
                block,
                row: selected_row,
                col,
            },
            local,
        );
        Ok(())
    }

    fn add_column(&mut self, side: Side) -> Result<(), EngineError> {
        let (block, row, col, local) = self.selected_cell()?;
        let Some(Block::Table(table)) = self.blocks.get_mut(block) else {
            return Err(EngineError::NotInTable);
        };
        let (at, selected_col) = match side {
            Side::Before => (col, col + 1),
            Side::After => (col + 1, col),
        };
        let headers: Vec<bool> = (0..table.rows.len())
            .map(|r| table.new_column_cell_is_header(at, r))
            .collect();
        for (cells, header) in table.rows.iter_mut().zip(headers) {
            let index = at.min(cells.len());
            cells.insert(index, TableCell::empty(header));
        }
        self.restore_cell_selection(
            SlotPath::Cell {
                block,
                row,
                col: selected_col,
            },
            local,
        );
        Ok(())
    }

    fn toggle_mark(&mut self, mark: &Mark) -> bool {
        let sel = self.selection.clone();
        if sel.is_empty() {
            return false;
        }
        let targets: Vec<(SlotPath, Range<usize>)> = self
            .slots()
            .into_iter()
            .filter(|s| s.start < sel.end && s.end() > sel.start)
            .map(|s| {
                let from = sel.start.max(s.start) - s.start;
                let to = sel.end.min(s.end()) - s.start;
                (s.path, from..to)
            })
            .filter(|(_, r)| !r.is_empty())
            .collect();
        if targets.is_empty() {
            return false;
        }

        let all_covered = targets.iter().all(|(path, range)| {
            self.text_block(*path)
                .is_some_and(|tb| marks::covers(&tb.marks, range, mark))
        });
        for (path, range) in targets {
            if let Some(tb) = self.text_block_mut(path) {
                if all_covered {
                    marks::remove_mark(&mut tb.marks, &range, mark);
                } else {
                    marks::add_mark(&mut tb.marks, range, mark.clone());
                }
            }
        }
        true
    }

    fn set_text_align(&mut self, align: TextAlign) -> bool {
        let sel = self.selection.clone();
        let paths: Vec<SlotPath> = self
            .slots()
            .into_iter()
            .filter(|s| s.start <= sel.end && s.end() >= sel.start)
            .map(|s| s.path)
            .collect();
        let mut touched = false;
        for path in paths {
            if let Some(tb) = self.text_block_mut(path)
                && tb.kind.is_alignable()
            {
                tb.align = align;
                touched = true;
            }
        }
        touched
    }
}

fn path_block(path: SlotPath) -> usize {
    match path {
        SlotPath::Block(i) => i,
        SlotPath::Cell { block, .. } => block,
    }
}

/// Slice `s` by byte offsets, widening to the nearest character boundaries
fn char_slice(s: &str, from: usize, to: usize) -> &str {
    let mut a = from.min(s.len());
    while !s.is_char_boundary(a) {
        a -= 1;
    }
    let mut b = to.min(s.len()).max(a);
    while !s.is_char_boundary(b) {
        b += 1;
    }
    &s[a..b]
}

/// Undo entries kept before the oldest is dropped
pub const HISTORY_DEPTH: usize = 100;

/// In-memory reference implementation of [`DocumentEngine`].
///
/// Holds a flat list of top-level blocks: text blocks, leaf nodes and
/// tables. Every dispatched transaction runs against a copy of the current
/// state and only replaces it when all steps succeed, so a failing step never
/// leaves a half-applied edit behind. Each content change pushes one entry
/// onto the undo history, which keeps the last [`HISTORY_DEPTH`] entries.
#[derive(Debug)]
pub struct Document {
    state: DocState,
    version: u64,
    history: VecDeque<DocState>,
    events: Vec<EngineEvent>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document holding one empty paragraph, cursor inside it
    pub fn new() -> Self {
        DocumentBuilder::default().build()
    }

    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::default()
    }

    /// One paragraph per line of `text`
    pub fn from_text(text: &str) -> Self {
        text.lines()
            .fold(DocumentBuilder::default(), |b, line| b.paragraph(line))
            .build()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Revert the last content-changing transaction
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.pop_back() else {
            return false;
        };
        self.state = previous;
        self.version += 1;
        self.events.push(EngineEvent::DocumentChanged {
            version: self.version,
        });
        self.events
            .push(EngineEvent::SelectionChanged(self.state.selection.clone()));
        true
    }

    /// Move the cursor; positions outside the document are rejected
    pub fn set_cursor(&mut self, pos: usize) -> Result<Patch, EngineError> {
        self.dispatch(Transaction::new().set_cursor(pos))
    }

    /// Kind and text of each top-level text block, in order
    pub fn text_blocks(&self) -> Vec<(TextBlockKind, String)> {
        self.state
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Text(tb) => Some((tb.kind, tb.content())),
                _ => None,
            })
            .collect()
    }

    /// Alignment of the top-level text block containing `pos`
    pub fn align_at(&self, pos: usize) -> Option<TextAlign> {
        let slot = self.state.slot_at(pos)?;
        self.state.text_block(slot.path).map(|tb| tb.align)
    }

    /// Mark spans of the text block containing `pos`, in block-local offsets
    pub fn marks_at(&self, pos: usize) -> Vec<MarkSpan> {
        self.state
            .slot_at(pos)
            .and_then(|slot| self.state.text_block(slot.path))
            .map(|tb| tb.marks.clone())
            .unwrap_or_default()
    }

    pub fn tables(&self) -> Vec<TableInfo> {
        let starts = self.state.block_starts();
        self.state
            .blocks
            .iter()
            .zip(starts)
            .filter_map(|(b, pos)| match b {
                Block::Table(t) => Some(TableInfo {
                    id: t.id,
                    pos,
                    rows: t.rows.len(),
                    cols: t.col_count(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Text of one table cell
    pub fn cell_text(&self, table: NodeId, row: usize, col: usize) -> Option<String> {
        self.state.blocks.iter().find_map(|b| match b {
            Block::Table(t) if t.id == table => {
                t.rows.get(row)?.get(col).map(|c| c.paragraph.content())
            }
            _ => None,
        })
    }

    /// Whether the given cell renders as a header cell
    pub fn is_header_cell(&self, table: NodeId, row: usize, col: usize) -> Option<bool> {
        self.state.blocks.iter().find_map(|b| match b {
            Block::Table(t) if t.id == table => t.rows.get(row)?.get(col).map(|c| c.header),
            _ => None,
        })
    }

    /// Every top-level block with its start position
    pub fn outline(&self) -> Vec<OutlineBlock> {
        let starts = self.state.block_starts();
        self.state
            .blocks
            .iter()
            .zip(starts)
            .map(|(b, pos)| match b {
                Block::Text(tb) => OutlineBlock::Text {
                    pos,
                    kind: tb.kind,
                    text: tb.content(),
                },
                Block::Leaf(node) => OutlineBlock::Node {
                    pos,
                    node: node.clone(),
                },
                Block::Table(t) => OutlineBlock::Table {
                    pos,
                    id: t.id,
                    cells: t
                        .rows
                        .iter()
                        .map(|row| row.iter().map(|c| c.paragraph.content()).collect())
                        .collect(),
                },
            })
            .collect()
    }

    pub(crate) fn blocks(&self) -> &[Block] {
        &self.state.blocks
    }
}

impl DocumentEngine for Document {
    fn dispatch(&mut self, tr: Transaction) -> Result<Patch, EngineError> {
        let mut next = self.state.clone();
        let mut changed = Vec::new();
        let mut content_changed = false;
        for step in tr.steps() {
            content_changed |= next.apply(step, &mut changed)?;
        }

        let old_selection = self.state.selection.clone();
        let previous = std::mem::replace(&mut self.state, next);
        if content_changed {
            if self.history.len() == HISTORY_DEPTH {
                self.history.pop_front();
            }
            self.history.push_back(previous);
            self.version += 1;
            self.events.push(EngineEvent::DocumentChanged {
                version: self.version,
            });
        }
        if self.state.selection != old_selection {
            self.events
                .push(EngineEvent::SelectionChanged(self.state.selection.clone()));
        }

        Ok(Patch {
            changed,
            new_selection: self.state.selection.clone(),
            version: self.version,
        })
    }

    fn resolve_position(&self, target: &ElementRef) -> Option<usize> {
        match *target {
            ElementRef::Node(id) => self.find_node(id).map(|(pos, _)| pos),
            ElementRef::TableCell { table, row, col } => {
                let block = self
                    .state
                    .blocks
                    .iter()
                    .position(|b| matches!(b, Block::Table(t) if t.id == table))?;
                self.state
                    .slot_for(SlotPath::Cell { block, row, col })
                    .map(|s| s.start)
            }
        }
    }

    fn text_between(&self, from: usize, to: usize) -> String {
        let mut out = String::new();
        for slot in self.state.slots() {
            let a = from.max(slot.start);
            let b = to.min(slot.end());
            if a >= b {
                continue;
            }
            if let Some(tb) = self.state.text_block(slot.path) {
                let content = tb.content();
                out.push_str(char_slice(&content, a - slot.start, b - slot.start));
            }
        }
        out
    }

    fn selection(&self) -> Range<usize> {
        self.state.selection.clone()
    }

    fn textblock_range(&self, pos: usize) -> Option<Range<usize>> {
        self.state.slot_at(pos).map(|s| s.start..s.end())
    }

    fn find_node(&self, id: NodeId) -> Option<(usize, DocumentNode)> {
        self.embedded_nodes().into_iter().find(|(_, n)| n.id == id)
    }

    fn embedded_nodes(&self) -> Vec<(usize, DocumentNode)> {
        let starts = self.state.block_starts();
        self.state
            .blocks
            .iter()
            .zip(starts)
            .filter_map(|(b, pos)| match b {
                Block::Leaf(node) => Some((pos, node.clone())),
                _ => None,
            })
            .collect()
    }

    fn size(&self) -> usize {
        self.state.size()
    }

    fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Incremental construction of a [`Document`]
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    blocks: Vec<Block>,
}

impl DocumentBuilder {
    pub fn paragraph(self, text: &str) -> Self {
        self.text_block(TextBlockKind::Paragraph, text)
    }

    pub fn heading(self, level: u8, text: &str) -> Self {
        self.text_block(TextBlockKind::Heading(level), text)
    }

    pub fn text_block(mut self, kind: TextBlockKind, text: &str) -> Self {
        self.blocks.push(Block::Text(TextBlock::with_text(kind, text)));
        self
    }

    /// Append a leaf node or an empty table
    pub fn node(mut self, kind: NodeKind) -> Self {
        self.blocks.push(Block::from_kind(kind, None));
        self
    }

    /// Append a table with the given cell texts
    pub fn table(mut self, rows: &[&[&str]], with_header_row: bool) -> Self {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(r, cells)| {
                cells
                    .iter()
                    .map(|text| TableCell {
                        header: with_header_row && r == 0,
                        paragraph: TextBlock::with_text(TextBlockKind::Paragraph, text),
                    })
                    .collect()
            })
            .collect();
        self.blocks.push(Block::Table(Table {
            id: NodeId::new(),
            rows,
        }));
        self
    }

    /// Finish the document with the cursor at the end of its last text block
    pub fn build(mut self) -> Document {
        if self.blocks.is_empty() {
            self.blocks
                .push(Block::Text(TextBlock::new(TextBlockKind::Paragraph)));
        }
        let mut state = DocState {
            blocks: self.blocks,
            selection: 0..0,
        };
        let cursor = state.slots().last().map(|s| s.end()).unwrap_or(0);
        state.selection = cursor..cursor;
        Document {
            state,
            version: 0,
            history: VecDeque::new(),
            events: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{ImageUploadAttrs, ResizableImageAttrs};
    use pretty_assertions::assert_eq;

    fn image(width: u32) -> NodeKind {
        NodeKind::ResizableImage(ResizableImageAttrs {
            src: "img.png".to_string(),
            width: Some(width),
            ..Default::default()
        })
    }

    #[test]
    fn test_new_document_has_cursor_in_empty_paragraph() {
        let doc = Document::new();
        assert_eq!(doc.size(), 2);
        assert_eq!(doc.selection(), 1..1);
        assert_eq!(doc.textblock_range(1), Some(1..1));
    }

    #[test]
    fn test_positions_of_consecutive_blocks() {
        let doc = Document::builder()
            .paragraph("ab")
            .node(NodeKind::HorizontalRule)
            .paragraph("cd")
            .build();
        // p(0) a b /p(3) hr(4) p(5) c d /p(8)
        assert_eq!(doc.size(), 9);
        assert_eq!(doc.textblock_range(1), Some(1..3));
        assert_eq!(doc.textblock_range(6), Some(6..8));
        assert_eq!(doc.textblock_range(4), None);
        assert_eq!(doc.text_between(0, doc.size()), "abcd");
        assert_eq!(doc.embedded_nodes()[0].0, 4);
    }

    #[test]
    fn test_insert_text_moves_cursor() {
        let mut doc = Document::from_text("hello");
        let patch = doc
            .dispatch(Transaction::new().insert_text(6, " world"))
            .unwrap();
        assert_eq!(doc.text_between(0, doc.size()), "hello world");
        assert_eq!(patch.new_selection, 12..12);
        assert_eq!(patch.version, 1);
    }

    #[test]
    fn test_failed_transaction_leaves_document_untouched() {
        let mut doc = Document::from_text("hello");
        let result = doc.dispatch(
            Transaction::new()
                .insert_text(1, "x")
                .delete(0..100),
        );
        assert!(result.is_err());
        assert_eq!(doc.text_between(0, doc.size()), "hello");
        assert_eq!(doc.version(), 0);
        assert!(doc.take_events().is_empty());
    }

    #[test]
    fn test_undo_reverts_one_transaction() {
        let mut doc = Document::from_text("ab");
        doc.dispatch(Transaction::new().insert_text(3, "c")).unwrap();
        doc.dispatch(Transaction::new().insert_text(4, "d")).unwrap();
        assert!(doc.undo());
        assert_eq!(doc.text_between(0, doc.size()), "abc");
        assert!(doc.undo());
        assert!(!doc.undo());
        assert_eq!(doc.text_between(0, doc.size()), "ab");
    }

    #[test]
    fn test_undo_history_keeps_most_recent_entries() {
        let mut doc = Document::from_text("");
        for i in 0..500 {
            doc.dispatch(Transaction::new().insert_text(1 + i, "x"))
                .unwrap();
        }
        let mut undone = 0;
        while doc.undo() {
            undone += 1;
        }
        assert_eq!(undone, HISTORY_DEPTH);
        assert_eq!(doc.text_between(0, doc.size()), "x".repeat(400));
    }

    #[test]
    fn test_events_report_content_and_selection_changes() {
        let mut doc = Document::from_text("ab");
        doc.set_cursor(1).unwrap();
        assert_eq!(doc.take_events(), vec![EngineEvent::SelectionChanged(1..1)]);

        doc.dispatch(Transaction::new().insert_text(1, "x")).unwrap();
        assert_eq!(
            doc.take_events(),
            vec![
                EngineEvent::DocumentChanged { version: 1 },
                EngineEvent::SelectionChanged(2..2),
            ]
        );
    }

    #[test]
    fn test_replace_leaf_with_same_kind_keeps_identity() {
        let mut doc = Document::builder()
            .paragraph("")
            .node(image(100))
            .build();
        let (pos, node) = doc.embedded_nodes()[0].clone();

        doc.replace_range(pos, pos + 1, image(300)).unwrap();

        let (new_pos, new_node) = doc.embedded_nodes()[0].clone();
        assert_eq!(new_pos, pos);
        assert_eq!(new_node.id, node.id);
        assert_eq!(new_node.kind, image(300));
    }

    #[test]
    fn test_replace_leaf_with_paragraph() {
        let mut doc = Document::builder()
            .paragraph("a")
            .node(NodeKind::ImageUpload(ImageUploadAttrs::default()))
            .build();
        doc.replace_range(3, 4, NodeKind::Text(TextBlockKind::Paragraph))
            .unwrap();
        assert!(doc.embedded_nodes().is_empty());
        assert_eq!(doc.text_blocks().len(), 2);
    }

    #[test]
    fn test_insert_node_into_empty_paragraph_replaces_it() {
        let mut doc = Document::builder().paragraph("").paragraph("next").build();
        doc.insert_node(1, NodeKind::HorizontalRule).unwrap();

        // hr(0) p(1) next /p(6)
        assert_eq!(doc.embedded_nodes()[0].0, 0);
        assert_eq!(
            doc.text_blocks(),
            vec![(TextBlockKind::Paragraph, "next".to_string())]
        );
        assert_eq!(doc.selection(), 2..2);
    }

    #[test]
    fn test_insert_node_splits_text_block() {
        let mut doc = Document::from_text("abcd");
        doc.insert_node(3, NodeKind::Spaghetto).unwrap();
        assert_eq!(
            doc.text_blocks(),
            vec![
                (TextBlockKind::Paragraph, "ab".to_string()),
                (TextBlockKind::Paragraph, "cd".to_string()),
            ]
        );
        // p a b /p(3) spaghetto(4) p(5) -> cursor at 6
        assert_eq!(doc.embedded_nodes()[0].0, 4);
        assert_eq!(doc.selection(), 6..6);
    }

    #[test]
    fn test_insert_table_at_end_keeps_trailing_paragraph() {
        let mut doc = Document::new();
        doc.insert_node(
            1,
            NodeKind::Table(TableSpec {
                rows: 2,
                cols: 2,
                with_header_row: true,
            }),
        )
        .unwrap();
        let tables = doc.tables();
        assert_eq!(tables.len(), 1);
        assert_eq!((tables[0].rows, tables[0].cols), (2, 2));
        assert_eq!(doc.text_blocks().len(), 1);
        assert_eq!(doc.is_header_cell(tables[0].id, 0, 1), Some(true));
        assert_eq!(doc.is_header_cell(tables[0].id, 1, 1), Some(false));
    }

    #[test]
    fn test_cell_positions_resolve_to_cell_text() {
        let doc = Document::builder()
            .table(&[&["a", "b"], &["c", "d"]], false)
            .build();
        let table = doc.tables()[0].id;
        let pos = doc
            .resolve_position(&ElementRef::TableCell { table, row: 1, col: 1 })
            .unwrap();
        assert_eq!(doc.text_between(pos, pos + 1), "d");
    }

    #[test]
    fn test_add_row_before_keeps_cursor_in_same_cell() {
        let mut doc = Document::builder()
            .table(&[&["a", "b"], &["c", "d"]], true)
            .build();
        let table = doc.tables()[0].id;
        let pos = doc
            .resolve_position(&ElementRef::TableCell { table, row: 0, col: 0 })
            .unwrap();
        doc.dispatch(
            Transaction::new()
                .set_cursor(pos)
                .step(Step::AddRow(Side::Before)),
        )
        .unwrap();

        assert_eq!(doc.tables()[0].rows, 3);
        assert_eq!(doc.cell_text(table, 0, 0), Some(String::new()));
        assert_eq!(doc.cell_text(table, 1, 0), Some("a".to_string()));
        // a row added above a header row at the table edge is a plain row
        assert_eq!(doc.is_header_cell(table, 0, 0), Some(false));
        assert_eq!(doc.is_header_cell(table, 1, 0), Some(true));
        let sel = doc.selection();
        assert_eq!(doc.text_between(sel.start, sel.start + 1), "a");
    }

    #[test]
    fn test_add_column_after() {
        let mut doc = Document::builder()
            .table(&[&["a", "b"], &["c", "d"]], false)
            .build();
        let table = doc.tables()[0].id;
        let pos = doc
            .resolve_position(&ElementRef::TableCell { table, row: 1, col: 0 })
            .unwrap();
        doc.dispatch(
            Transaction::new()
                .set_cursor(pos)
                .step(Step::AddColumn(Side::After)),
        )
        .unwrap();

        assert_eq!(doc.tables()[0].cols, 3);
        assert_eq!(doc.cell_text(table, 0, 1), Some(String::new()));
        assert_eq!(doc.cell_text(table, 0, 2), Some("b".to_string()));
    }

    #[test]
    fn test_add_row_outside_table_fails() {
        let mut doc = Document::from_text("x");
        assert_eq!(
            doc.dispatch(Transaction::new().step(Step::AddRow(Side::After))),
            Err(EngineError::NotInTable)
        );
    }

    #[test]
    fn test_toggle_mark_adds_then_removes() {
        let mut doc = Document::from_text("rainbow");
        doc.dispatch(
            Transaction::new()
                .set_selection(1..8)
                .step(Step::ToggleMark(Mark::Rainbow)),
        )
        .unwrap();
        assert_eq!(doc.marks_at(1).len(), 1);

        doc.dispatch(Transaction::new().step(Step::ToggleMark(Mark::Rainbow)))
            .unwrap();
        assert!(doc.marks_at(1).is_empty());
    }

    #[test]
    fn test_split_heading_at_end_starts_paragraph() {
        let mut doc = Document::builder().heading(1, "Title").build();
        doc.dispatch(Transaction::new().step(Step::SplitBlock { at: 6 }))
            .unwrap();
        assert_eq!(
            doc.text_blocks(),
            vec![
                (TextBlockKind::Heading(1), "Title".to_string()),
                (TextBlockKind::Paragraph, String::new()),
            ]
        );
        assert_eq!(doc.selection(), 8..8);
    }

    #[test]
    fn test_text_between_widens_to_char_boundaries() {
        let doc = Document::from_text("a🙂b");
        // the emoji spans bytes 1..5 of the block, positions 2..6
        assert_eq!(doc.text_between(2, 3), "🙂");
    }

    #[test]
    fn test_set_text_align_skips_code_blocks() {
        let mut doc = Document::builder()
            .paragraph("a")
            .text_block(TextBlockKind::CodeBlock, "b")
            .build();
        doc.dispatch(
            Transaction::new()
                .set_selection(1..5)
                .step(Step::SetTextAlign(TextAlign::Center)),
        )
        .unwrap();
        assert_eq!(doc.align_at(1), Some(TextAlign::Center));
        assert_eq!(doc.align_at(5), Some(TextAlign::Left));
    }

    #[test]
    fn test_outline_lists_blocks_with_positions() {
        let doc = Document::builder()
            .paragraph("ab")
            .node(NodeKind::HorizontalRule)
            .table(&[&["x", "y"]], true)
            .build();
        let outline = doc.outline();
        assert_eq!(outline.len(), 3);
        assert_eq!(
            outline[0],
            OutlineBlock::Text {
                pos: 0,
                kind: TextBlockKind::Paragraph,
                text: "ab".to_string(),
            }
        );
        assert!(matches!(&outline[1], OutlineBlock::Node { pos: 4, node } if node.kind == NodeKind::HorizontalRule));
        match &outline[2] {
            OutlineBlock::Table { pos, cells, .. } => {
                assert_eq!(*pos, 5);
                assert_eq!(cells, &vec![vec!["x".to_string(), "y".to_string()]]);
            }
            other => panic!("expected a table, got {other:?}"),
        }
    }
}
