//! # Node Catalog
//!
//! The closed set of node kinds the extension layer knows about. Every kind
//! carries its own attribute struct, and dispatch over kinds is a `match` on
//! [`NodeKind`] rather than a string-keyed lookup.
//!
//! Sizes follow the positional model of the reference engine: leaf nodes
//! occupy one position, text blocks occupy their text length plus an opening
//! and closing token.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a node in the document tree
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a visual element owned by the host UI (node view roots,
/// popups, affordances)
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ElementId(pub Uuid);

impl ElementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

/// Fieldless tag for a node kind, used for type comparisons and factory lookup
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    Paragraph,
    Heading,
    CodeBlock,
    Blockquote,
    BulletItem,
    OrderedItem,
    Table,
    ImageUpload,
    ResizableImage,
    HorizontalRule,
    Spaghetto,
}

impl NodeType {
    /// Schema name of the node type
    pub fn name(&self) -> &'static str {
        match self {
            NodeType::Paragraph => "paragraph",
            NodeType::Heading => "heading",
            NodeType::CodeBlock => "codeBlock",
            NodeType::Blockquote => "blockquote",
            NodeType::BulletItem => "bulletList",
            NodeType::OrderedItem => "orderedList",
            NodeType::Table => "table",
            NodeType::ImageUpload => "imageUpload",
            NodeType::ResizableImage => "resizableImage",
            NodeType::HorizontalRule => "horizontalRule",
            NodeType::Spaghetto => "spaghetto",
        }
    }
}

/// Kinds of block that hold inline text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextBlockKind {
    Paragraph,
    Heading(u8),
    CodeBlock,
    Blockquote,
    BulletItem,
    OrderedItem,
}

impl TextBlockKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            TextBlockKind::Paragraph => NodeType::Paragraph,
            TextBlockKind::Heading(_) => NodeType::Heading,
            TextBlockKind::CodeBlock => NodeType::CodeBlock,
            TextBlockKind::Blockquote => NodeType::Blockquote,
            TextBlockKind::BulletItem => NodeType::BulletItem,
            TextBlockKind::OrderedItem => NodeType::OrderedItem,
        }
    }

    /// Whether the block carries the `textAlign` global attribute
    pub fn is_alignable(&self) -> bool {
        matches!(self, TextBlockKind::Paragraph | TextBlockKind::Heading(_))
    }
}

/// `textAlign` global attribute of paragraphs and headings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl TextAlign {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
            TextAlign::Justify => "justify",
        }
    }
}

/// Inline marks applied over text ranges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    Rainbow,
    Mention { id: String },
}

/// Attributes of the image upload placeholder node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageUploadAttrs {
    pub src: Option<String>,
    pub alt: Option<String>,
    pub title: Option<String>,
}

/// Width a freshly uploaded image starts at
pub const DEFAULT_IMAGE_WIDTH: u32 = 100;

/// Attributes of the resizable image node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResizableImageAttrs {
    pub src: String,
    pub alt: Option<String>,
    pub title: Option<String>,
    /// Rendered width in pixels; `None` renders at the minimum width
    pub width: Option<u32>,
}

/// Shape of a table created by an insert command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub rows: usize,
    pub cols: usize,
    pub with_header_row: bool,
}

/// A node of the closed catalog together with its attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// An empty text block of the given kind
    Text(TextBlockKind),
    Table(TableSpec),
    ImageUpload(ImageUploadAttrs),
    ResizableImage(ResizableImageAttrs),
    HorizontalRule,
    Spaghetto,
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Text(kind) => kind.node_type(),
            NodeKind::Table(_) => NodeType::Table,
            NodeKind::ImageUpload(_) => NodeType::ImageUpload,
            NodeKind::ResizableImage(_) => NodeType::ResizableImage,
            NodeKind::HorizontalRule => NodeType::HorizontalRule,
            NodeKind::Spaghetto => NodeType::Spaghetto,
        }
    }

    /// Leaf nodes have no content and occupy a single position
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            NodeKind::ImageUpload(_)
                | NodeKind::ResizableImage(_)
                | NodeKind::HorizontalRule
                | NodeKind::Spaghetto
        )
    }

    /// Structural size of a freshly created node of this kind
    pub fn size(&self) -> usize {
        match self {
            NodeKind::Text(_) => 2,
            // every cell holds one empty paragraph: cell(2) + paragraph(2)
            NodeKind::Table(spec) => 2 + spec.rows * (2 + spec.cols * 4),
            _ => 1,
        }
    }
}

/// A typed node in the document tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentNode {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl DocumentNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn size(&self) -> usize {
        self.kind.size()
    }
}
