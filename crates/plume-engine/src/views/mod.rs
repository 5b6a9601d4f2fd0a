//! View components for the custom node types.

pub mod image_upload;
pub mod resizable_image;
pub mod spaghetto;

pub use image_upload::{INVALID_FILE_MESSAGE, ImageUploadView};
pub use resizable_image::ResizableImageView;
pub use spaghetto::{SPAGHETTO_IMAGE, SpaghettoView};

use crate::listeners::SharedHub;
use crate::node_view::NodeViewRegistry;
use crate::nodes::NodeType;
use crate::resize::ResizeLimits;

/// Register the stock view factories for every custom node type
pub fn register_defaults(registry: &mut NodeViewRegistry, hub: SharedHub, limits: ResizeLimits) {
    registry.register(NodeType::ImageUpload, || Box::new(ImageUploadView::new()));
    registry.register(NodeType::ResizableImage, move || {
        Box::new(ResizableImageView::new(hub.clone(), limits))
    });
    registry.register(NodeType::Spaghetto, || Box::new(SpaghettoView::new()));
}
