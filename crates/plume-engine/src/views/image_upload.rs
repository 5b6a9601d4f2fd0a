use std::any::Any;

use crate::node_view::{NodeReplacer, UploadedFile, ViewComponent, ViewEvent};
use crate::nodes::{DEFAULT_IMAGE_WIDTH, DocumentNode, ElementId, NodeKind, ResizableImageAttrs};

/// Shown inline when the picked file is not an image
pub const INVALID_FILE_MESSAGE: &str = "Please select a valid image file";

/// Placeholder view that turns into a resizable image once a file is picked
#[derive(Default)]
pub struct ImageUploadView {
    element: ElementId,
    node: Option<DocumentNode>,
    replacer: Option<NodeReplacer>,
    error: Option<&'static str>,
    selected_file: Option<String>,
    renders: usize,
}

impl ImageUploadView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self) -> Option<&str> {
        self.error
    }

    pub fn selected_file(&self) -> Option<&str> {
        self.selected_file.as_deref()
    }

    pub fn renders(&self) -> usize {
        self.renders
    }

    fn file_selected(&mut self, file: &UploadedFile) -> bool {
        if !file.mime.starts_with("image/") {
            log::debug!("rejected upload of {} ({})", file.name, file.mime);
            self.error = Some(INVALID_FILE_MESSAGE);
            self.detect_changes();
            return true;
        }
        self.error = None;
        self.selected_file = Some(file.name.clone());

        let Some(replacer) = &self.replacer else {
            return false;
        };
        replacer.request_replace(NodeKind::ResizableImage(ResizableImageAttrs {
            src: file.data_url.clone(),
            alt: Some(file.name.clone()),
            title: None,
            width: Some(DEFAULT_IMAGE_WIDTH),
        }))
    }
}

impl ViewComponent for ImageUploadView {
    fn element(&self) -> ElementId {
        self.element
    }

    fn set_node(&mut self, node: DocumentNode) {
        self.node = Some(node);
    }

    fn set_replacer(&mut self, replacer: NodeReplacer) {
        self.replacer = Some(replacer);
    }

    fn detect_changes(&mut self) {
        self.renders += 1;
    }

    fn handle_event(&mut self, event: &ViewEvent) -> bool {
        match event {
            ViewEvent::FileSelected(file) => self.file_selected(file),
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self.error {
            Some(message) => format!("[image upload: {message}]"),
            None => "[image upload: choose an image]".to_string(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
