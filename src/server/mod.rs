//! HTTP front serving rendered page images.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │             GET /images/{doc_id}/{n}[.thumb].png                │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    pages    │  │        routes           │  │
//! │  │ (requests)  │  │   (HTML)    │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod pages;
pub mod routes;

pub use handlers::{
    error_status, health_handler, image_handler, AppState, ErrorResponse, HealthResponse, ImageFailure,
    ImageQueryParams, CACHE_HIT_HEADER, DIRECT_COPY_HEADER, FALLBACK_HEADER,
};
pub use pages::{index_page, wrapper_page, THUMBNAIL_INFIX};
pub use routes::{create_router, RouterConfig};
