//! Page image model.
//!
//! - [`ImageKey`]: `(document id, page number)` identifier
//! - [`PageImage`]: decoded pixels plus resolution/crop metadata
//! - [`PageImageMeta`]: the metadata header, parseable without decoding pixels
//! - [`BoundingBox`]: crop regions in original-resolution coordinates
//! - [`compose`]: multi-page composites

mod bbox;
mod key;
mod page;
mod transform;

pub use bbox::BoundingBox;
pub use key::{ImageKey, MIN_DOC_ID_LEN};
pub use page::{
    decode_png, PageImage, PageImageMeta, FIXED_HEADER_LEN, FORMAT_VERSION, IMAGE_FORMAT, MAGIC,
};
pub use transform::{compose, StackAxis, MAX_IMAGE_PIXELS};
