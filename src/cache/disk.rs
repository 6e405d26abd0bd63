use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use super::{lock, DISK_POLL_INTERVAL};
use crate::error::ImageError;
use crate::imaging::ImageKey;
use crate::store::{read_if_exists, write_atomic, PageImageSource, StoreLayout};

/// Write-through file cache of encoded page images in front of another source.
///
/// Files use the same sharded layout as the server-side store. In
/// synchronized mode an in-flight marker set makes concurrent misses for one
/// key share a single upstream fetch and a single write.
pub struct DiskCache {
    inner: Arc<dyn PageImageSource>,
    layout: StoreLayout,
    synchronized: bool,
    in_flight: Mutex<HashSet<ImageKey>>,
    poll_interval: Duration,
    name: String,
}

impl DiskCache {
    pub fn new(inner: Arc<dyn PageImageSource>, root: impl AsRef<Path>, synchronized: bool) -> Self {
        let name = format!("disk-cache({})", inner.name());
        Self {
            inner,
            layout: StoreLayout::new(root.as_ref()),
            synchronized,
            in_flight: Mutex::new(HashSet::new()),
            poll_interval: DISK_POLL_INTERVAL,
            name,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Whether `key` is already cached locally.
    pub async fn is_cached(&self, key: &ImageKey) -> bool {
        tokio::fs::try_exists(self.layout.page_path(key))
            .await
            .unwrap_or(false)
    }

    async fn read_cached(&self, key: &ImageKey) -> Result<Option<Bytes>, ImageError> {
        let data = read_if_exists(&self.layout.page_path(key)).await?;
        if data.is_some() {
            debug!(key = %key, "Disk cache hit");
        }
        Ok(data.map(Bytes::from))
    }

    async fn fetch_and_write(&self, key: &ImageKey) -> Result<Bytes, ImageError> {
        debug!(key = %key, source = self.inner.name(), "Disk cache miss, fetching");
        let data = self.inner.fetch(key).await?;
        if let Err(e) = write_atomic(&self.layout.page_path(key), &data).await {
            // The fetched image is still good; only the local copy is lost
            warn!(key = %key, error = %e, "Failed to write disk cache entry");
        }
        Ok(data)
    }

    async fn fetch_synchronized(&self, key: &ImageKey) -> Result<Bytes, ImageError> {
        loop {
            if let Some(data) = self.read_cached(key).await? {
                return Ok(data);
            }

            let claimed = lock(&self.in_flight).insert(key.clone());
            if claimed {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        let _marker = InFlightMarker {
            set: &self.in_flight,
            key,
        };

        // The previous fetcher may have finished between our read and the claim
        if let Some(data) = self.read_cached(key).await? {
            return Ok(data);
        }
        self.fetch_and_write(key).await
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("inner", &self.inner.name())
            .field("root", &self.layout.root())
            .field("synchronized", &self.synchronized)
            .finish()
    }
}

#[async_trait]
impl PageImageSource for DiskCache {
    async fn is_available(&self, key: &ImageKey) -> bool {
        self.is_cached(key).await || self.inner.is_available(key).await
    }

    async fn fetch(&self, key: &ImageKey) -> Result<Bytes, ImageError> {
        if self.synchronized {
            return self.fetch_synchronized(key).await;
        }
        if let Some(data) = self.read_cached(key).await? {
            return Ok(data);
        }
        self.fetch_and_write(key).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Removes its key from the in-flight set when dropped.
struct InFlightMarker<'a> {
    set: &'a Mutex<HashSet<ImageKey>>,
    key: &'a ImageKey,
}

impl Drop for InFlightMarker<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(self.key);
    }
}
