//! Scripted editor sessions.
//!
//! A scenario file describes a starting document and a list of steps, each
//! one an interaction a user would perform in a browser: typing, key
//! presses, hovering table borders, uploading a file, dragging an image
//! handle. Replaying it drives an [`Editor`] headlessly so the resulting
//! HTML can be inspected.

use std::path::{Path, PathBuf};

use plume_engine::geometry::Point;
use plume_engine::keys::{Key, KeyPress, Modifiers};
use plume_engine::node_view::{UploadedFile, ViewEvent};
use plume_engine::table::{Hovered, TableGeometry};
use plume_engine::views::ResizableImageView;
use plume_engine::{
    Document, DocumentBuilder, DocumentEngine, Editor, EditorOptions, NodeId, NodeKind,
    NodeType, ResizableImageAttrs,
};
use serde::Deserialize;
use thiserror::Error;

/// Size of every table cell when replaying pointer steps
pub const CELL_WIDTH: f64 = 100.0;
pub const CELL_HEIGHT: f64 = 40.0;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse scenario at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Unknown key '{0}'")]
    UnknownKey(String),

    #[error("Step {step}: no table with index {table}")]
    NoSuchTable { step: usize, table: usize },

    #[error("Step {step}: no image with index {image}")]
    NoSuchImage { step: usize, image: usize },

    #[error("Step {step}: the document holds no upload placeholder")]
    NoUploadPlaceholder { step: usize },

    #[error("Step {step}: position {pos} is not inside a text block")]
    InvalidCursor { step: usize, pos: usize },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockSpec {
    Paragraph {
        #[serde(default)]
        text: String,
    },
    Heading {
        level: u8,
        text: String,
    },
    Table {
        rows: Vec<Vec<String>>,
        #[serde(default)]
        header: bool,
    },
    Image {
        src: String,
        width: Option<u32>,
    },
    Upload,
    Rule,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Type text character by character
    Type { text: String },
    /// Press a key, e.g. `Enter`, `ArrowDown` or `Mod-Shift-r`
    Key { key: String },
    Cursor { pos: usize },
    Undo,
    /// Move the pointer to `x`/`y` relative to the table's top-left corner
    Hover { table: usize, x: f64, y: f64 },
    /// Move the pointer off every table and affordance
    Leave,
    ClickAffordance { table: usize },
    Scroll,
    /// Pick a file in the first upload placeholder
    Upload {
        name: String,
        mime: String,
        data_url: String,
    },
    /// Drag the resize handle of an image by `dx` pixels
    Resize { image: usize, dx: f64 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub document: Vec<BlockSpec>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ScenarioError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn build_document(&self) -> Document {
        self.document
            .iter()
            .fold(Document::builder(), add_block)
            .build()
    }

    /// Run every step against a fresh editor
    pub fn replay(&self, options: EditorOptions) -> Result<Editor, ScenarioError> {
        let mut editor = Editor::new(self.build_document(), options);
        for (index, step) in self.steps.iter().enumerate() {
            log::debug!("step {index}: {step:?}");
            apply_step(&mut editor, index, step)?;
        }
        Ok(editor)
    }
}

fn add_block(builder: DocumentBuilder, block: &BlockSpec) -> DocumentBuilder {
    match block {
        BlockSpec::Paragraph { text } => builder.paragraph(text),
        BlockSpec::Heading { level, text } => builder.heading(*level, text),
        BlockSpec::Table { rows, header } => {
            let cells: Vec<Vec<&str>> = rows
                .iter()
                .map(|row| row.iter().map(String::as_str).collect())
                .collect();
            let refs: Vec<&[&str]> = cells.iter().map(Vec::as_slice).collect();
            builder.table(&refs, *header)
        }
        BlockSpec::Image { src, width } => {
            builder.node(NodeKind::ResizableImage(ResizableImageAttrs {
                src: src.clone(),
                width: *width,
                ..Default::default()
            }))
        }
        BlockSpec::Upload => builder.node(NodeKind::ImageUpload(Default::default())),
        BlockSpec::Rule => builder.node(NodeKind::HorizontalRule),
    }
}

/// Parse shortcut notation such as `Mod-Shift-r` or `ArrowDown`
pub fn parse_key(notation: &str) -> Result<KeyPress, ScenarioError> {
    let (prefix, name) = match notation.rsplit_once('-') {
        Some((prefix, name)) if !name.is_empty() => (prefix, name),
        _ => ("", notation),
    };

    let key = match name {
        "Enter" => Key::Enter,
        "Escape" => Key::Escape,
        "Backspace" => Key::Backspace,
        "Tab" => Key::Tab,
        "ArrowUp" => Key::ArrowUp,
        "ArrowDown" => Key::ArrowDown,
        "ArrowLeft" => Key::ArrowLeft,
        "ArrowRight" => Key::ArrowRight,
        "Space" => Key::Char(' '),
        _ => {
            let mut chars = name.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Char(c),
                _ => return Err(ScenarioError::UnknownKey(notation.to_string())),
            }
        }
    };

    let mut modifiers = Modifiers::NONE;
    for part in prefix.split('-').filter(|p| !p.is_empty()) {
        match part {
            "Mod" | "Ctrl" => modifiers.ctrl = true,
            "Meta" | "Cmd" => modifiers.meta = true,
            "Shift" => modifiers.shift = true,
            "Alt" => modifiers.alt = true,
            _ => return Err(ScenarioError::UnknownKey(notation.to_string())),
        }
    }
    Ok(KeyPress::with(key, modifiers))
}

fn table_geometry(editor: &Editor, step: usize, table: usize) -> Result<TableGeometry, ScenarioError> {
    let info = editor
        .document()
        .tables()
        .get(table)
        .copied()
        .ok_or(ScenarioError::NoSuchTable { step, table })?;
    Ok(TableGeometry::uniform(
        info.id,
        Point::new(0.0, 0.0),
        Point::new(0.0, 0.0),
        info.rows,
        info.cols,
        CELL_WIDTH,
        CELL_HEIGHT,
    ))
}

fn nodes_of_type(editor: &Editor, node_type: NodeType) -> Vec<NodeId> {
    editor
        .document()
        .embedded_nodes()
        .into_iter()
        .filter(|(_, node)| node.node_type() == node_type)
        .map(|(_, node)| node.id)
        .collect()
}

fn apply_step(editor: &mut Editor, index: usize, step: &Step) -> Result<(), ScenarioError> {
    match step {
        Step::Type { text } => editor.type_text(text),
        Step::Key { key } => {
            let press = parse_key(key)?;
            if !editor.key_down(&press) {
                log::info!("step {index}: key {key} was not handled");
            }
        }
        Step::Cursor { pos } => {
            if !editor.set_cursor(*pos) {
                return Err(ScenarioError::InvalidCursor {
                    step: index,
                    pos: *pos,
                });
            }
        }
        Step::Undo => {
            editor.undo();
        }
        Step::Hover { table, x, y } => {
            let geometry = table_geometry(editor, index, *table)?;
            let pointer = Point::new(*x, *y);
            let target = editor.table_pointer_move(&geometry, geometry.target_at(pointer), pointer);
            log::info!("step {index}: hover target {target:?}");
        }
        Step::Leave => editor.document_pointer_move(Hovered::Outside),
        Step::ClickAffordance { table } => {
            let geometry = table_geometry(editor, index, *table)?;
            if !editor.affordance_click(&geometry) {
                log::info!("step {index}: no affordance to click");
            }
        }
        Step::Scroll => editor.document_scroll(),
        Step::Upload {
            name,
            mime,
            data_url,
        } => {
            let node = nodes_of_type(editor, NodeType::ImageUpload)
                .first()
                .copied()
                .ok_or(ScenarioError::NoUploadPlaceholder { step: index })?;
            editor.view_event(
                node,
                &ViewEvent::FileSelected(UploadedFile {
                    name: name.clone(),
                    mime: mime.clone(),
                    data_url: data_url.clone(),
                }),
            );
        }
        Step::Resize { image, dx } => {
            let node = nodes_of_type(editor, NodeType::ResizableImage)
                .get(*image)
                .copied()
                .ok_or(ScenarioError::NoSuchImage {
                    step: index,
                    image: *image,
                })?;
            let rendered_width = editor
                .registry()
                .view::<ResizableImageView>(node)
                .and_then(ResizableImageView::current_width)
                .unwrap_or_default();
            editor.view_event(
                node,
                &ViewEvent::ResizeStart {
                    pointer_x: 0.0,
                    rendered_width: f64::from(rendered_width),
                },
            );
            editor.pointer_move(*dx);
            editor.pointer_up();
        }
    }
    Ok(())
}
