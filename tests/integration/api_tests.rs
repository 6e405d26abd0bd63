//! API integration tests for the HTTP front.
//!
//! Tests verify:
//! - Page images, crops, scaling and thumbnails
//! - Wrapper and index HTML pages
//! - Error cases and fallback images
//! - Response codes and headers

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use page_image_store::cache::MemoryCache;
use page_image_store::protocol::RemoteImageClient;
use page_image_store::service::{ImageService, ServiceConfig};
use page_image_store::{create_router, RouterConfig};

use super::test_utils::{
    is_png, plain_png, png_dimensions, sample_page, unused_addr, MockSource,
};

fn router_for(service: ImageService) -> Router {
    create_router(Arc::new(service), RouterConfig::new().with_tracing(false))
}

fn default_router(source: MockSource) -> Router {
    router_for(ImageService::new(
        Arc::new(source),
        MemoryCache::new(16, true),
        ServiceConfig::default(),
    ))
}

async fn get(router: &Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let router = default_router(MockSource::new());
    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
}

// =============================================================================
// Page Images
// =============================================================================

#[tokio::test]
async fn test_image_direct_copy_then_cache_hit() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(120, 60, 96));
    let router = default_router(source);

    let first = get(&router, "/images/AB12CD/1.png").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "content-type"), "image/png");
    assert_eq!(header(&first, "x-image-direct-copy"), "true");
    assert_eq!(header(&first, "x-image-cache-hit"), "false");
    assert_eq!(header(&first, "x-image-fallback"), "false");
    assert!(header(&first, "cache-control").contains("max-age"));
    let body = body_bytes(first).await;
    assert!(is_png(&body));
    assert_eq!(png_dimensions(&body), (120, 60));

    let second = get(&router, "/images/AB12CD/1.png").await;
    assert_eq!(header(&second, "x-image-cache-hit"), "true");
    assert_eq!(header(&second, "x-image-direct-copy"), "false");
}

#[tokio::test]
async fn test_image_dpi_scaling() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(300, 150, 300));
    let router = default_router(source);

    let response = get(&router, "/images/AB12CD/1.png?dpi=100").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(png_dimensions(&body_bytes(response).await), (100, 50));

    // Unparseable dpi falls back to the configured default of 96
    let response = get(&router, "/images/AB12CD/1.png?dpi=abc").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(png_dimensions(&body_bytes(response).await), (96, 48));
}

#[tokio::test]
async fn test_image_crop() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(200, 200, 96));
    let router = default_router(source);

    let response = get(&router, "/images/AB12CD/1.png?box=%5B20,60,30,50%5D&dpi=0").await;
    assert_eq!(response.status(), StatusCode::OK);
    // Default margin of 3 pixels on each side
    assert_eq!(png_dimensions(&body_bytes(response).await), (46, 26));
}

#[tokio::test]
async fn test_thumbnail() {
    let source = MockSource::new().with_page("AB12CD", 2, &sample_page(192, 96, 96));
    let router = default_router(source);

    let response = get(&router, "/images/AB12CD/2.thumb.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(png_dimensions(&body_bytes(response).await), (48, 24));
}

// =============================================================================
// HTML Pages
// =============================================================================

#[tokio::test]
async fn test_wrapper_page_forwards_query() {
    let router = default_router(MockSource::new());

    let response = get(&router, "/images/AB12CD/7?dpi=50").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-type").starts_with("text/html"));

    let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert!(html.contains("src=\"7.png?dpi=50\""));
}

#[tokio::test]
async fn test_index_page() {
    let router = default_router(MockSource::new());

    let response = get(&router, "/images/AB12CD/1-3,5").await;
    assert_eq!(response.status(), StatusCode::OK);

    let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    for page in [1, 2, 3, 5] {
        assert!(html.contains(&format!("src=\"{}.thumb.png\"", page)));
        assert!(html.contains(&format!("href=\"{}\"", page)));
    }
    assert!(!html.contains("4.thumb.png"));
}

#[tokio::test]
async fn test_invalid_page_spec() {
    let router = default_router(MockSource::new());
    let response = get(&router, "/images/AB12CD/5-2").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Errors and Fallback
// =============================================================================

#[tokio::test]
async fn test_missing_image_not_found() {
    let router = default_router(MockSource::new());

    let response = get(&router, "/images/AB12CD/9.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_missing_image_fallback() {
    let fallback = plain_png(8, 8);
    let service = ImageService::new(
        Arc::new(MockSource::new()),
        MemoryCache::new(4, true),
        ServiceConfig::default(),
    )
    .with_default_image(fallback.clone());
    let router = router_for(service);

    let response = get(&router, "/images/00ab9f/3.png?dpi=0").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-image-fallback"), "true");
    assert_eq!(header(&response, "cache-control"), "no-cache");
    assert_eq!(body_bytes(response).await, fallback);
}

#[tokio::test]
async fn test_bad_box_is_not_found() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(50, 50, 96));
    let router = default_router(source);

    let response = get(&router, "/images/AB12CD/1.png?box=%5B5,1,0,10%5D").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn test_bad_box_uses_fallback_when_configured() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(50, 50, 96));
    let service = ImageService::new(Arc::new(source), MemoryCache::new(4, true), ServiceConfig::default())
        .with_default_image(plain_png(4, 4));
    let router = router_for(service);

    let response = get(&router, "/images/AB12CD/1.png?box=garbage").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-image-fallback"), "true");
}

#[tokio::test]
async fn test_bad_document_id() {
    let router = default_router(MockSource::new());

    let response = get(&router, "/images/ab/1.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&router, "/images/ab/1.thumb.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&router, "/images/ab/1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unreachable_upstream_is_not_found() {
    let client = RemoteImageClient::new(unused_addr().await);
    let service = ImageService::new(Arc::new(client), MemoryCache::new(4, true), ServiceConfig::default());
    let router = router_for(service);

    let response = get(&router, "/images/AB12CD/1.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["error"], "transport_error");

    let response = get(&router, "/images/AB12CD/1.thumb.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_excessive_dpi_is_rejected() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(40, 20, 96));
    let router = default_router(source);

    let response = get(&router, "/images/AB12CD/1.png?dpi=4294967295").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["error"], "invalid_request");

    // The front keeps serving
    let response = get(&router, "/images/AB12CD/1.png?dpi=0").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_excessive_dpi_uses_fallback_when_configured() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(40, 20, 96));
    let service = ImageService::new(Arc::new(source), MemoryCache::new(4, true), ServiceConfig::default())
        .with_default_image(plain_png(4, 4));
    let router = router_for(service);

    let response = get(&router, "/images/AB12CD/1.png?dpi=20000").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-image-fallback"), "true");
}
