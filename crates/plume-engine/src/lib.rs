pub mod commands;
pub mod editing;
pub mod editor;
pub mod geometry;
pub mod html;
pub mod input_rules;
pub mod keys;
pub mod listeners;
pub mod node_view;
pub mod nodes;
pub mod resize;
pub mod suggestion;
pub mod table;
pub mod views;

// Re-export key types for easier usage
pub use editing::{
    Document, DocumentBuilder, DocumentEngine, EngineError, EngineEvent, OutlineBlock,
    SharedEngine, Transaction,
};
pub use editor::{Editor, EditorOptions};
pub use geometry::{InsertTarget, Point, Rect};
pub use keys::{Key, KeyPress, Modifiers};
pub use nodes::*;
