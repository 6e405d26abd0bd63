use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tracing::debug;

use super::{lock, CacheKey, Slot, MEMORY_POLL_INTERVAL};
use crate::error::ImageError;
use crate::imaging::PageImage;

type Entries = LruCache<CacheKey, Slot<Arc<PageImage>>>;

/// Outcome of [`MemoryCache::get_or_fetch`].
#[derive(Debug)]
pub struct CacheLookup<X> {
    pub image: Arc<PageImage>,

    /// Extra output of the fetch closure; `None` when served from the cache.
    pub fetched: Option<X>,
}

impl<X> CacheLookup<X> {
    pub fn is_hit(&self) -> bool {
        self.fetched.is_none()
    }
}

/// Bounded LRU map of decoded page images.
///
/// Lookups refresh recency. A capacity of zero disables the cache: every
/// request goes to the fetch closure and nothing is retained.
pub struct MemoryCache {
    entries: Option<Mutex<Entries>>,
    synchronized: bool,
    poll_interval: Duration,
}

impl MemoryCache {
    pub fn new(capacity: usize, synchronized: bool) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            synchronized,
            poll_interval: MEMORY_POLL_INTERVAL,
        }
    }

    /// Override the waiter poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn capacity(&self) -> usize {
        self.entries
            .as_ref()
            .map(|entries| lock(entries).cap().get())
            .unwrap_or(0)
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Number of entries, including in-flight markers.
    pub fn len(&self) -> usize {
        self.entries
            .as_ref()
            .map(|entries| lock(entries).len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a present entry, marking it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<PageImage>> {
        let entries = self.entries.as_ref()?;
        match lock(entries).get(key) {
            Some(Slot::Present(image)) => Some(image.clone()),
            _ => None,
        }
    }

    /// Whether a present entry exists, without touching recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .as_ref()
            .map(|entries| matches!(lock(entries).peek(key), Some(Slot::Present(_))))
            .unwrap_or(false)
    }

    /// Insert or replace an entry, evicting the least recently used one if full.
    pub fn put(&self, key: CacheKey, image: Arc<PageImage>) {
        if let Some(entries) = &self.entries {
            lock(entries).put(key, Slot::Present(image));
        }
    }

    /// Return the cached image for `key`, or run `fetch` and cache its result.
    ///
    /// In synchronized mode concurrent callers for the same key share one
    /// fetch; the others poll until the entry is present. A failed fetch leaves
    /// no entry behind, so the next caller retries.
    pub async fn get_or_fetch<F, Fut, X>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> Result<CacheLookup<X>, ImageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(Arc<PageImage>, X), ImageError>>,
    {
        let Some(entries) = &self.entries else {
            let (image, extra) = fetch().await?;
            return Ok(CacheLookup {
                image,
                fetched: Some(extra),
            });
        };

        if !self.synchronized {
            if let Some(image) = self.get(&key) {
                debug!(key = %key.key, variant = ?key.variant, "Memory cache hit");
                return Ok(CacheLookup {
                    image,
                    fetched: None,
                });
            }
            let (image, extra) = fetch().await?;
            self.put(key, image.clone());
            return Ok(CacheLookup {
                image,
                fetched: Some(extra),
            });
        }

        loop {
            // Quick look first; most requests end here
            let fetching = match lock(entries).get(&key) {
                Some(Slot::Present(image)) => {
                    debug!(key = %key.key, variant = ?key.variant, "Memory cache hit");
                    return Ok(CacheLookup {
                        image: image.clone(),
                        fetched: None,
                    });
                }
                Some(Slot::Fetching) => true,
                None => false,
            };

            if !fetching {
                let claimed = {
                    let mut guard = lock(entries);
                    match guard.get(&key) {
                        Some(Slot::Present(image)) => {
                            return Ok(CacheLookup {
                                image: image.clone(),
                                fetched: None,
                            });
                        }
                        Some(Slot::Fetching) => false,
                        None => {
                            guard.put(key.clone(), Slot::Fetching);
                            true
                        }
                    }
                };
                if claimed {
                    break;
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        debug!(key = %key.key, variant = ?key.variant, "Memory cache miss, fetching");
        let marker = FetchingMarker {
            entries,
            key: Some(key.clone()),
        };
        let (image, extra) = fetch().await?;
        marker.fulfil(image.clone());

        Ok(CacheLookup {
            image,
            fetched: Some(extra),
        })
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("synchronized", &self.synchronized)
            .finish()
    }
}

/// Claim on a `Fetching` slot. Dropping it without [`fulfil`](Self::fulfil)
/// (error or cancelled request) removes the marker.
struct FetchingMarker<'a> {
    entries: &'a Mutex<Entries>,
    key: Option<CacheKey>,
}

impl FetchingMarker<'_> {
    fn fulfil(mut self, image: Arc<PageImage>) {
        if let Some(key) = self.key.take() {
            lock(self.entries).put(key, Slot::Present(image));
        }
    }
}

impl Drop for FetchingMarker<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let mut entries = lock(self.entries);
            if matches!(entries.peek(&key), Some(Slot::Fetching)) {
                entries.pop(&key);
            }
        }
    }
}
