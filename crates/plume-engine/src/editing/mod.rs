/*!
 * # Editing Core Module
 *
 * The extension layer never owns the document. It talks to a document
 * engine through the [`DocumentEngine`] trait, which exposes the engine's
 * mutation primitives and its read queries:
 *
 * - **`dispatch`**: apply a [`Transaction`] atomically (the unit of undo)
 * - **`insert_node`** / **`replace_range`**: single-step transactions
 * - **`resolve_position`**: map a rendered element to a document offset
 * - **`text_between`**: read the text between two offsets
 * - **`take_events`**: drain `SelectionChanged` / `DocumentChanged` notifications
 *
 * ## Positions
 *
 * Offsets follow the usual tree-position model: every node boundary counts
 * as one position, text counts one position per UTF-8 byte.
 *
 * ## Reference Engine
 *
 * [`Document`] is an in-memory engine with a small closed schema. Hosts that
 * embed a real engine implement [`DocumentEngine`] for it instead; the
 * extension modules only ever see the trait.
 *
 * ## Module Structure
 *
 * - **`transaction`**: `Step` enum and `Transaction` builder
 * - **`document`**: the reference `Document` engine
 * - **`marks`**: mark span bookkeeping for text blocks
 * - **`patch`**: result metadata of a dispatched transaction
 */

pub mod document;
pub mod marks;
pub mod patch;
pub mod transaction;

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

pub use document::{Document, DocumentBuilder, HISTORY_DEPTH, OutlineBlock, TableInfo};
pub use marks::MarkSpan;
pub use patch::Patch;
pub use transaction::{Side, Step, Transaction};

use crate::nodes::{DocumentNode, NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("position {pos} is outside the document (size {size})")]
    OutOfRange { pos: usize, size: usize },
    #[error("no text block at position {0}")]
    NotInTextBlock(usize),
    #[error("selection is not inside a table cell")]
    NotInTable,
    #[error("cannot replace {from}..{to}: {reason}")]
    InvalidReplace {
        from: usize,
        to: usize,
        reason: &'static str,
    },
}

/// Notifications surfaced by the engine after a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SelectionChanged(Range<usize>),
    DocumentChanged { version: u64 },
}

/// A rendered element the host wants a document position for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRef {
    /// The root element of a node view
    Node(NodeId),
    /// A cell of a rendered table
    TableCell { table: NodeId, row: usize, col: usize },
}

/// The document engine as seen by the extension layer
pub trait DocumentEngine {
    /// Apply every step of `tr` or none of them
    fn dispatch(&mut self, tr: Transaction) -> Result<Patch, EngineError>;

    /// Map a rendered element to a document offset (`posAtDOM`)
    fn resolve_position(&self, target: &ElementRef) -> Option<usize>;

    /// Text between two offsets; node boundaries contribute nothing
    fn text_between(&self, from: usize, to: usize) -> String;

    fn selection(&self) -> Range<usize>;

    /// Content range of the text block containing `pos`
    fn textblock_range(&self, pos: usize) -> Option<Range<usize>>;

    /// Current position and value of a node (`getPos`)
    fn find_node(&self, id: NodeId) -> Option<(usize, DocumentNode)>;

    /// Leaf nodes that may be rendered through node views, in document order
    fn embedded_nodes(&self) -> Vec<(usize, DocumentNode)>;

    /// Total content size of the document
    fn size(&self) -> usize;

    /// Drain pending notifications
    fn take_events(&mut self) -> Vec<EngineEvent>;

    fn insert_node(&mut self, at: usize, node: NodeKind) -> Result<Patch, EngineError> {
        self.dispatch(Transaction::new().insert_node(at, node))
    }

    fn replace_range(
        &mut self,
        from: usize,
        to: usize,
        node: NodeKind,
    ) -> Result<Patch, EngineError> {
        self.dispatch(Transaction::new().replace_with(from, to, node))
    }
}

/// Engine handle shared between the host and the interactions that call
/// back into it
pub type SharedEngine = Rc<RefCell<dyn DocumentEngine>>;
