//! HTTP request handlers for the page image front.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /images/{doc_id}/{n}.png` - Page image (`box`, `dpi` query parameters)
//! - `GET /images/{doc_id}/{n}.thumb.png` - Page thumbnail
//! - `GET /images/{doc_id}/{n}` - HTML page embedding the image
//! - `GET /images/{doc_id}/{a-b,c}` - HTML thumbnail index

use std::sync::Arc;

use axum::{
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::pages::{index_page, wrapper_page, THUMBNAIL_INFIX};
use crate::cache::Variant;
use crate::error::ImageError;
use crate::imaging::{ImageKey, IMAGE_FORMAT};
use crate::service::{ImageRequest, ImageService, PageSpec, ServedImage};

/// Response header: served from the memory cache.
pub const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-image-cache-hit");

/// Response header: forwarded without re-encoding.
pub const DIRECT_COPY_HEADER: HeaderName = HeaderName::from_static("x-image-direct-copy");

/// Response header: a fallback image was substituted.
pub const FALLBACK_HEADER: HeaderName = HeaderName::from_static("x-image-fallback");

// =============================================================================
// Application State
// =============================================================================

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ImageService>,

    /// Cache-Control max-age in seconds for rendered images
    pub cache_max_age: u32,
}

impl AppState {
    pub fn new(service: Arc<ImageService>) -> Self {
        Self {
            service,
            cache_max_age: 3600,
        }
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters of image requests.
#[derive(Debug, Default, Deserialize)]
pub struct ImageQueryParams {
    /// One or more `[left,right,top,bottom]` boxes
    #[serde(rename = "box", default)]
    pub boxes: Option<String>,

    /// Target resolution; unparseable values fall back to the default
    #[serde(default)]
    pub dpi: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Status code and error type identifier of an [`ImageError`].
pub fn error_status(err: &ImageError) -> (StatusCode, &'static str) {
    match err {
        ImageError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ImageError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        ImageError::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication_failed"),
        ImageError::Transport(_) => (StatusCode::BAD_GATEWAY, "transport_error"),
        ImageError::Protocol(_) => (StatusCode::INTERNAL_SERVER_ERROR, "protocol_error"),
        ImageError::Decode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "decode_error"),
        ImageError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        ImageError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    }
}

/// 5xx errors are logged at ERROR, 404 at DEBUG, other 4xx at WARN.
impl IntoResponse for ImageError {
    fn into_response(self) -> Response {
        let (status, error_type) = error_status(&self);
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let body = ErrorResponse::with_status(error_type, message, status);
        (status, Json(body)).into_response()
    }
}

/// Failure of an image or thumbnail request that no fallback covered.
///
/// Anything but a rejected session is answered with `404 Not Found`; the
/// JSON body keeps the error type of the underlying [`ImageError`].
#[derive(Debug)]
pub struct ImageFailure(pub ImageError);

impl IntoResponse for ImageFailure {
    fn into_response(self) -> Response {
        let err = self.0;
        if matches!(err, ImageError::Authentication(_)) {
            return err.into_response();
        }

        let (cause, error_type) = error_status(&err);
        let message = err.to_string();
        if cause.is_server_error() {
            error!(error_type = error_type, "Image unavailable: {}", message);
        } else {
            debug!(error_type = error_type, "Image unavailable: {}", message);
        }

        let status = StatusCode::NOT_FOUND;
        let body = ErrorResponse::with_status(error_type, message, status);
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Dispatch `/images/{doc_id}/{file}` on the shape of `file`.
///
/// # Response
///
/// - `200 OK`: `image/png` with `Cache-Control`, `X-Image-Cache-Hit`,
///   `X-Image-Direct-Copy` and `X-Image-Fallback`, or `text/html` for the
///   wrapper and index pages
/// - `400 Bad Request`: malformed document id or page specification of an
///   HTML page
/// - `401 Unauthorized`: the image server rejected the session
/// - `404 Not Found`: an image or thumbnail could not be produced and no
///   fallback is configured; the body names the underlying error type
pub async fn image_handler(
    State(state): State<AppState>,
    Path((doc_id, file)): Path<(String, String)>,
    Query(params): Query<ImageQueryParams>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let service = &state.service;

    if let Some(stem) = file
        .strip_suffix(IMAGE_FORMAT)
        .and_then(|s| s.strip_suffix('.'))
    {
        let served = if let Some(page) = stem.strip_suffix(THUMBNAIL_INFIX) {
            match parse_key(&doc_id, page) {
                Ok(key) => service.serve_thumbnail(&key).await,
                Err(e) => service.with_fallback(Err(e), Variant::Thumbnail),
            }
        } else {
            let request = parse_key(&doc_id, stem).and_then(|key| {
                ImageRequest::from_params(key, params.boxes.as_deref(), params.dpi.as_deref())
            });
            match request {
                Ok(request) => service.serve_image(&request).await,
                Err(e) => service.with_fallback(Err(e), Variant::Full),
            }
        };
        return match served {
            Ok(served) => image_response(served, state.cache_max_age),
            Err(e) => ImageFailure(e).into_response(),
        };
    }

    match html_page(&doc_id, &file, raw_query.as_deref()) {
        Ok(html) => Html(html).into_response(),
        Err(e) => e.into_response(),
    }
}

fn html_page(doc_id: &str, file: &str, query: Option<&str>) -> Result<String, ImageError> {
    // Validates the document id even though the HTML pages never touch the store
    ImageKey::new(doc_id, 0)?;
    Ok(match PageSpec::parse(file)? {
        PageSpec::Single(page) => wrapper_page(doc_id, page, query),
        spec @ PageSpec::Pages(_) => index_page(doc_id, &spec.pages()),
    })
}

fn parse_key(doc_id: &str, page: &str) -> Result<ImageKey, ImageError> {
    let page = page
        .parse::<u32>()
        .map_err(|_| ImageError::InvalidRequest(format!("Invalid page number: {}", page)))?;
    ImageKey::new(doc_id, page)
}

fn image_response(served: ServedImage, cache_max_age: u32) -> Response {
    let cache_control = if served.fallback {
        HeaderValue::from_static("no-cache")
    } else {
        HeaderValue::from_str(&format!("public, max-age={}", cache_max_age))
            .unwrap_or(HeaderValue::from_static("no-cache"))
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (header::CACHE_CONTROL, cache_control),
            (CACHE_HIT_HEADER, bool_header(served.cache_hit)),
            (DIRECT_COPY_HEADER, bool_header(served.direct_copy)),
            (FALLBACK_HEADER, bool_header(served.fallback)),
        ],
        served.data,
    )
        .into_response()
}

fn bool_header(value: bool) -> HeaderValue {
    HeaderValue::from_static(if value { "true" } else { "false" })
}
