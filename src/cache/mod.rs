//! Client-side cache tiers in front of a [`PageImageSource`](crate::store::PageImageSource).
//!
//! - [`DiskCache`] keeps encoded page images as files; a file on disk is a hit.
//! - [`MemoryCache`] keeps decoded [`PageImage`](crate::imaging::PageImage)s in
//!   a bounded LRU map.
//!
//! Both tiers can run in single-flight mode, where concurrent requests for one
//! key share a single upstream fetch. Waiters poll at a fixed interval instead
//! of blocking on a notification. Locks are only held for map updates, never
//! across I/O.

mod disk;
mod memory;

pub use disk::DiskCache;
pub use memory::{CacheLookup, MemoryCache};

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::imaging::ImageKey;

/// Poll interval for waiters on an in-flight memory cache entry.
pub const MEMORY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Poll interval for waiters on an in-flight disk cache fetch.
pub const DISK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of decoded images held in memory.
pub const DEFAULT_MEMORY_CACHE_SIZE: usize = 32;

/// State of a cache entry. Absence is "no entry".
#[derive(Debug, Clone)]
pub enum Slot<T> {
    /// Some request is fetching this entry right now
    Fetching,
    Present(T),
}

/// Which rendition of a page an in-memory entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Full,
    Thumbnail,
}

/// Key of the memory cache: a page plus its rendition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub key: ImageKey,
    pub variant: Variant,
}

impl CacheKey {
    pub fn full(key: ImageKey) -> Self {
        Self {
            key,
            variant: Variant::Full,
        }
    }

    pub fn thumbnail(key: ImageKey) -> Self {
        Self {
            key,
            variant: Variant::Thumbnail,
        }
    }
}

/// Lock a map mutex, recovering the data if a previous holder panicked.
///
/// Critical sections only perform map operations, so a poisoned map is still
/// consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
