//! Derivation and serving of page images.
//!
//! Turns logical requests (full page, crop, multi-page composite, thumbnail)
//! into PNG responses, going through the memory cache and the configured
//! [`PageImageSource`](crate::store::PageImageSource).

mod images;
mod request;

pub use images::{
    load_fallback_image, ImageService, ServedImage, ServiceConfig, DEFAULT_CROP_MARGIN,
    DEFAULT_IMAGE_DPI, DEFAULT_MAX_DPI, DEFAULT_THUMBNAIL_DPI,
};
pub use request::{ImageRequest, PageSpec, MAX_INDEX_PAGES};
