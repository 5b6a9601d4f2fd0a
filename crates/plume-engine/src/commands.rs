//! Editor commands exposed by the custom node and mark extensions.
//!
//! A [`Command`] compiles to a [`Transaction`] against the current selection,
//! so every command is a single undo step.

use crate::editing::{DocumentEngine, EngineError, Patch, Step, Transaction};
use crate::keys::KeyPress;
use crate::nodes::{
    ImageUploadAttrs, Mark, NodeKind, ResizableImageAttrs, TableSpec, TextAlign,
};

/// Keyboard shortcut bound to [`Command::ToggleRainbow`]
pub const RAINBOW_SHORTCUT: &str = "Mod-Shift-r";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Insert an empty image upload placeholder
    SetImageUpload,
    /// Insert an image with the given source and width
    SetResizableImage {
        src: String,
        alt: Option<String>,
        width: Option<u32>,
    },
    InsertTable(TableSpec),
    InsertHorizontalRule,
    ToggleRainbow,
    SetTextAlign(TextAlign),
}

impl Command {
    /// Build the transaction for this command at the engine's selection
    pub fn compile(&self, engine: &dyn DocumentEngine) -> Transaction {
        let sel = engine.selection();
        let insert = |node| Transaction::new().replace_with(sel.start, sel.end, node);
        match self {
            Command::SetImageUpload => insert(NodeKind::ImageUpload(ImageUploadAttrs::default())),
            Command::SetResizableImage { src, alt, width } => {
                insert(NodeKind::ResizableImage(ResizableImageAttrs {
                    src: src.clone(),
                    alt: alt.clone(),
                    title: None,
                    width: *width,
                }))
            }
            Command::InsertTable(spec) => insert(NodeKind::Table(*spec)),
            Command::InsertHorizontalRule => insert(NodeKind::HorizontalRule),
            Command::ToggleRainbow => Transaction::new().step(Step::ToggleMark(Mark::Rainbow)),
            Command::SetTextAlign(align) => Transaction::new().step(Step::SetTextAlign(*align)),
        }
    }

    /// Command bound to a key press, if any
    pub fn for_shortcut(press: &KeyPress) -> Option<Command> {
        press
            .matches(RAINBOW_SHORTCUT)
            .then_some(Command::ToggleRainbow)
    }
}

pub fn run(engine: &mut dyn DocumentEngine, cmd: &Command) -> Result<Patch, EngineError> {
    let tr = cmd.compile(engine);
    engine.dispatch(tr)
}

pub fn set_image_upload(engine: &mut dyn DocumentEngine) -> Result<Patch, EngineError> {
    run(engine, &Command::SetImageUpload)
}

pub fn set_resizable_image(
    engine: &mut dyn DocumentEngine,
    width: Option<u32>,
    src: &str,
    alt: Option<&str>,
) -> Result<Patch, EngineError> {
    run(
        engine,
        &Command::SetResizableImage {
            src: src.to_string(),
            alt: alt.map(str::to_string),
            width,
        },
    )
}

pub fn toggle_rainbow(engine: &mut dyn DocumentEngine) -> Result<Patch, EngineError> {
    run(engine, &Command::ToggleRainbow)
}

pub fn set_text_align(
    engine: &mut dyn DocumentEngine,
    align: TextAlign,
) -> Result<Patch, EngineError> {
    run(engine, &Command::SetTextAlign(align))
}
