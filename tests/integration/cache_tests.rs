//! Cache tier tests: single-flight fetching, LRU eviction and the full
//! client stack in front of a loopback image server.

use std::sync::Arc;
use std::time::Duration;

use page_image_store::cache::{CacheKey, DiskCache, MemoryCache};
use page_image_store::imaging::PageImage;
use page_image_store::protocol::RemoteImageClient;
use page_image_store::service::{ImageRequest, ImageService, ServiceConfig};
use page_image_store::store::PageImageSource;

use super::test_utils::{key, sample_page, MockSource, TestServer};

const CONCURRENT_REQUESTS: usize = 16;

// =============================================================================
// Disk Cache
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disk_cache_single_flight() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new()
        .with_page("AB12CD", 1, &sample_page(64, 64, 96))
        .with_delay(Duration::from_millis(100));
    let cache = Arc::new(
        DiskCache::new(Arc::new(source.clone()), dir.path(), true)
            .with_poll_interval(Duration::from_millis(10)),
    );
    let k = key("AB12CD", 1);
    let expected = source.encoded(&k).unwrap();

    let handles: Vec<_> = (0..CONCURRENT_REQUESTS)
        .map(|_| {
            let cache = cache.clone();
            let k = k.clone();
            tokio::spawn(async move { cache.fetch(&k).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), expected);
    }

    assert_eq!(source.fetch_count(), 1);
    let written = std::fs::read(cache.layout().page_path(&k)).unwrap();
    assert_eq!(written, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disk_cache_unsynchronized_still_correct() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new()
        .with_page("AB12CD", 1, &sample_page(64, 64, 96))
        .with_delay(Duration::from_millis(50));
    let cache = Arc::new(DiskCache::new(Arc::new(source.clone()), dir.path(), false));
    let k = key("AB12CD", 1);
    let expected = source.encoded(&k).unwrap();

    let handles: Vec<_> = (0..CONCURRENT_REQUESTS)
        .map(|_| {
            let cache = cache.clone();
            let k = k.clone();
            tokio::spawn(async move { cache.fetch(&k).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), expected);
    }

    assert!(source.fetch_count() >= 1);
    assert!(cache.is_cached(&k).await);
}

// =============================================================================
// Memory Cache
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_cache_single_flight_through_service() {
    let source = MockSource::new()
        .with_page("doc1", 1, &sample_page(50, 50, 96))
        .with_delay(Duration::from_millis(100));
    let service = Arc::new(ImageService::new(
        Arc::new(source.clone()),
        MemoryCache::new(8, true).with_poll_interval(Duration::from_millis(10)),
        ServiceConfig::default(),
    ));

    let handles: Vec<_> = (0..CONCURRENT_REQUESTS)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .render_image(&ImageRequest::new(key("doc1", 1)))
                    .await
            })
        })
        .collect();

    let mut fetched = 0;
    for handle in handles {
        let served = handle.await.unwrap().unwrap();
        if !served.cache_hit {
            fetched += 1;
        }
    }
    assert_eq!(fetched, 1);
    assert_eq!(source.fetch_count(), 1);
}

#[test]
fn test_memory_cache_lru_eviction() {
    let capacity = 3;
    let cache = MemoryCache::new(capacity, true);
    let image = |w| Arc::new(PageImage::new(image::DynamicImage::new_luma8(w, 1), 96, None));

    for page in 1..=capacity as u32 {
        cache.put(CacheKey::full(key("doc1", page)), image(page));
    }
    // Page 1 becomes most recently used, page 2 the eviction candidate
    assert!(cache.get(&CacheKey::full(key("doc1", 1))).is_some());
    cache.put(CacheKey::full(key("doc1", 4)), image(4));

    assert_eq!(cache.len(), capacity);
    assert!(!cache.contains(&CacheKey::full(key("doc1", 2))));
    for page in [1, 3, 4] {
        assert!(cache.contains(&CacheKey::full(key("doc1", page))));
    }
}

// =============================================================================
// Full Client Stack
// =============================================================================

#[tokio::test]
async fn test_service_over_disk_cache_over_remote_server() {
    let store_dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(store_dir.path()).await;
    let page = sample_page(200, 100, 200);
    server.store.store(&key("AB12CD", 1), &page).await.unwrap();

    let remote: Arc<dyn PageImageSource> = Arc::new(RemoteImageClient::new(server.addr_string()));
    let disk = Arc::new(DiskCache::new(remote, cache_dir.path(), true));
    let service = ImageService::new(disk.clone(), MemoryCache::new(4, true), ServiceConfig::default());

    let request = ImageRequest::new(key("AB12CD", 1)).with_dpi(0);
    let first = service.render_image(&request).await.unwrap();
    assert!(first.direct_copy);
    assert!(disk.is_cached(&key("AB12CD", 1)).await);

    // The server going away does not matter once both tiers hold the page
    drop(server);
    let second = service.render_image(&request).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.dpi, 200);

    // A fresh memory tier is served from the disk tier alone
    let cold = ImageService::new(disk, MemoryCache::new(4, false), ServiceConfig::default());
    let third = cold.render_image(&request).await.unwrap();
    assert!(third.direct_copy);
    assert_eq!(third.data, first.data);
}
