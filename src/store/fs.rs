use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::layout::{read_if_exists, write_atomic, StoreLayout};
use super::{ImageStore, PageImageSource};
use crate::error::ImageError;
use crate::imaging::{ImageKey, PageImage, PageImageMeta};

/// Default name reported as the source of images read from a local store.
const DEFAULT_STORE_NAME: &str = "local-store";

/// Filesystem-backed [`ImageStore`] using the sharded [`StoreLayout`].
#[derive(Debug, Clone)]
pub struct FsImageStore {
    layout: StoreLayout,
    name: Arc<str>,
}

impl FsImageStore {
    /// Create a store rooted at `root`. Directories are created lazily on write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            layout: StoreLayout::new(root.as_ref()),
            name: Arc::from(DEFAULT_STORE_NAME),
        }
    }

    /// Override the source name stamped on retrieved images.
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Arc::from(name.as_ref());
        self
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub async fn is_available(&self, key: &ImageKey) -> bool {
        tokio::fs::try_exists(self.layout.page_path(key))
            .await
            .unwrap_or(false)
    }

    pub async fn store(&self, key: &ImageKey, image: &PageImage) -> Result<(), ImageError> {
        let data = image.encode()?;
        self.write(key, &data).await
    }

    pub async fn store_encoded(&self, key: &ImageKey, data: Bytes) -> Result<(), ImageError> {
        PageImage::decode(&data)?;
        self.write(key, &data).await
    }

    pub async fn retrieve(&self, key: &ImageKey) -> Result<Option<PageImage>, ImageError> {
        match self.retrieve_encoded(key).await? {
            Some(data) => PageImage::decode(&data).map(Some),
            None => Ok(None),
        }
    }

    pub async fn retrieve_encoded(&self, key: &ImageKey) -> Result<Option<Bytes>, ImageError> {
        let path = self.layout.page_path(key);
        let Some(data) = read_if_exists(&path).await? else {
            debug!(key = %key, "Page image not in store");
            return Ok(None);
        };
        PageImageMeta::parse(&data)?;
        Ok(Some(Bytes::from(data)))
    }

    async fn write(&self, key: &ImageKey, data: &[u8]) -> Result<(), ImageError> {
        let path = self.layout.page_path(key);
        write_atomic(&path, data).await?;
        debug!(key = %key, bytes = data.len(), path = %path.display(), "Stored page image");
        Ok(())
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn is_available(&self, key: &ImageKey) -> bool {
        FsImageStore::is_available(self, key).await
    }

    async fn store(&self, key: &ImageKey, image: &PageImage) -> Result<(), ImageError> {
        FsImageStore::store(self, key, image).await
    }

    async fn store_encoded(&self, key: &ImageKey, data: Bytes) -> Result<(), ImageError> {
        FsImageStore::store_encoded(self, key, data).await
    }

    async fn retrieve(&self, key: &ImageKey) -> Result<Option<PageImage>, ImageError> {
        FsImageStore::retrieve(self, key).await
    }

    async fn retrieve_encoded(&self, key: &ImageKey) -> Result<Option<Bytes>, ImageError> {
        FsImageStore::retrieve_encoded(self, key).await
    }
}

#[async_trait]
impl PageImageSource for FsImageStore {
    async fn is_available(&self, key: &ImageKey) -> bool {
        FsImageStore::is_available(self, key).await
    }

    async fn fetch(&self, key: &ImageKey) -> Result<Bytes, ImageError> {
        self.retrieve_encoded(key)
            .await?
            .ok_or_else(|| ImageError::NotFound(key.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
