//! Test utilities for integration tests.
//!
//! Mock page image sources with fetch tracking, sample images and a loopback
//! image server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, Rgb, RgbImage};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use page_image_store::auth::SignedSessionAuthority;
use page_image_store::error::ImageError;
use page_image_store::imaging::{ImageKey, PageImage};
use page_image_store::protocol::ImageServer;
use page_image_store::store::{FsImageStore, PageImageSource};

pub const TEST_SECRET: &str = "integration-test-secret";

// =============================================================================
// Sample Images
// =============================================================================

/// A page with a deterministic gradient so pixel comparisons are meaningful.
pub fn sample_page(width: u32, height: u32, dpi: u32) -> PageImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    PageImage::new(DynamicImage::ImageRgb8(img), dpi, None)
}

/// A plain PNG file (no page header), as used for fallback images.
pub fn plain_png(width: u32, height: u32) -> Bytes {
    sample_page(width, height, 72).encode_png().unwrap()
}

pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

pub fn png_dimensions(data: &[u8]) -> (u32, u32) {
    let img = page_image_store::imaging::decode_png(data).unwrap();
    (img.width(), img.height())
}

pub fn key(doc_id: &str, page: u32) -> ImageKey {
    ImageKey::new(doc_id, page).unwrap()
}

// =============================================================================
// Mock Source with Fetch Tracking
// =============================================================================

/// In-memory page image source counting every fetch.
#[derive(Clone, Default)]
pub struct MockSource {
    pages: Arc<HashMap<ImageKey, Bytes>>,
    errors: Arc<HashMap<ImageKey, ImageError>>,
    fetch_count: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, doc_id: &str, page: u32, image: &PageImage) -> Self {
        Arc::make_mut(&mut self.pages).insert(key(doc_id, page), image.encode().unwrap());
        self
    }

    pub fn with_error(mut self, doc_id: &str, page: u32, error: ImageError) -> Self {
        Arc::make_mut(&mut self.errors).insert(key(doc_id, page), error);
        self
    }

    /// Make every fetch take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn encoded(&self, key: &ImageKey) -> Option<Bytes> {
        self.pages.get(key).cloned()
    }
}

#[async_trait]
impl PageImageSource for MockSource {
    async fn is_available(&self, key: &ImageKey) -> bool {
        self.pages.contains_key(key)
    }

    async fn fetch(&self, key: &ImageKey) -> Result<Bytes, ImageError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.errors.get(key) {
            return Err(err.clone());
        }
        self.pages
            .get(key)
            .cloned()
            .ok_or_else(|| ImageError::NotFound(key.to_string()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Loopback Image Server
// =============================================================================

/// A running image server on an ephemeral localhost port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: FsImageStore,
    pub authority: SignedSessionAuthority,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(root: &Path) -> Self {
        let store = FsImageStore::new(root);
        let authority = SignedSessionAuthority::new(TEST_SECRET);
        let server = ImageServer::new(Arc::new(store.clone()), Arc::new(authority.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            server.run(listener).await;
        });

        Self {
            addr,
            store,
            authority,
            handle,
        }
    }

    pub fn token(&self) -> String {
        self.authority.sign("tester", Duration::from_secs(600))
    }

    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// An address nothing listens on.
pub async fn unused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}
