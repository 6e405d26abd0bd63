//! Server-side page image store and the read-side source abstraction.
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────────┐
//! │   ImageServer (TCP)  │        │  DiskCache / ImageService │
//! └──────────┬───────────┘        └────────────┬─────────────┘
//!            │ ImageStore                      │ PageImageSource
//!            ▼                                 ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                      FsImageStore                        │
//! │           <root>/<id[0:2]>/<id[2:4]>/<id>/...            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! [`PageImageSource`] is implemented by everything that can hand out encoded
//! page images: the local store, the remote wire-protocol client, and the disk
//! cache decorating either of them.

mod fs;
mod layout;

pub use fs::FsImageStore;
pub use layout::{read_if_exists, write_atomic, StoreLayout};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ImageError;
use crate::imaging::{ImageKey, PageImage};

/// Anything that can supply encoded page images (header + PNG) by key.
#[async_trait]
pub trait PageImageSource: Send + Sync {
    /// Whether an image exists for `key`. Never fails; errors count as "no".
    async fn is_available(&self, key: &ImageKey) -> bool;

    /// Fetch the encoded image. Absence is reported as [`ImageError::NotFound`].
    async fn fetch(&self, key: &ImageKey) -> Result<Bytes, ImageError>;

    /// Name used for logging and as the `source` of decoded images.
    fn name(&self) -> &str;
}

/// Persistent, writable page image storage.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// True iff a file exists for `key`.
    async fn is_available(&self, key: &ImageKey) -> bool;

    /// Persist an image, replacing any previous one for the same key.
    async fn store(&self, key: &ImageKey, image: &PageImage) -> Result<(), ImageError>;

    /// Persist an already encoded image after validating it.
    async fn store_encoded(&self, key: &ImageKey, data: Bytes) -> Result<(), ImageError>;

    /// Load and decode; `None` when absent.
    async fn retrieve(&self, key: &ImageKey) -> Result<Option<PageImage>, ImageError>;

    /// Load the raw file after header validation; `None` when absent.
    async fn retrieve_encoded(&self, key: &ImageKey) -> Result<Option<Bytes>, ImageError>;
}
