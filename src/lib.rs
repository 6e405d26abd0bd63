//! # Page Image Store
//!
//! A distributed store for scanned document page images.
//!
//! - An image server persists page images in a sharded directory layout and
//!   answers a small line-framed protocol (`CHECK_AVAILABLE`, `GET`, `STORE`).
//! - Clients put a disk cache and a decoded-image memory cache in front of the
//!   protocol, optionally with single-flight fetching.
//! - A serving layer derives thumbnails, crops and multi-page composites at
//!   any resolution, forwarding fetched bytes untouched when nothing needs to
//!   change, and substitutes fallback images on failure.
//! - An axum HTTP front exposes all of it.
//!
//! ## Architecture
//!
//! ```text
//!  HTTP front ─► ImageService ─► MemoryCache ─► DiskCache ─► RemoteImageClient
//!                                                                 │ TCP
//!                                         FsImageStore ◄─ ImageServer
//! ```
//!
//! - [`imaging`] - keys, page images, binary codec and transformations
//! - [`store`] - on-disk layout and the store/source traits
//! - [`protocol`] - wire protocol server and client
//! - [`cache`] - disk and memory cache tiers
//! - [`service`] - request resolution and fallback policy
//! - [`server`] - HTTP routes and handlers
//! - [`auth`] - session validation for uploads
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use page_image_store::{
//!     create_router, FsImageStore, ImageService, MemoryCache, RouterConfig, ServiceConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(FsImageStore::new("/srv/page-images"));
//!     let service = ImageService::new(store, MemoryCache::new(32, true), ServiceConfig::default());
//!     let router = create_router(Arc::new(service), RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod imaging;
pub mod protocol;
pub mod server;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use auth::{AuthError, SessionAuthority, SignedSessionAuthority};
pub use cache::{CacheKey, CacheLookup, DiskCache, MemoryCache, Slot, Variant};
pub use config::{CheckConfig, Cli, Command, FrontConfig, ServeConfig, SignConfig, UploadConfig};
pub use error::ImageError;
pub use imaging::{compose, BoundingBox, ImageKey, PageImage, PageImageMeta, StackAxis};
pub use protocol::{Connection, ImageServer, RemoteImageClient};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use service::{ImageRequest, ImageService, PageSpec, ServedImage, ServiceConfig};
pub use store::{FsImageStore, ImageStore, PageImageSource, StoreLayout};
