//! Image service tests: derivations, composites and fallback handling.

use std::sync::Arc;

use page_image_store::cache::MemoryCache;
use page_image_store::error::ImageError;
use page_image_store::imaging::{BoundingBox, StackAxis};
use page_image_store::service::{ImageRequest, ImageService, ServiceConfig};

use super::test_utils::{is_png, key, plain_png, png_dimensions, sample_page, MockSource};

fn service(source: MockSource, config: ServiceConfig) -> ImageService {
    ImageService::new(Arc::new(source), MemoryCache::new(16, true), config)
}

fn no_margin() -> ServiceConfig {
    ServiceConfig {
        crop_margin: 0,
        ..ServiceConfig::default()
    }
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test]
async fn test_missing_page_served_as_fallback() {
    let fallback = plain_png(10, 10);
    let svc = service(MockSource::new(), ServiceConfig::default())
        .with_default_image(fallback.clone());

    let request = ImageRequest::new(key("00ab9f", 3)).with_dpi(0);
    let served = svc.serve_image(&request).await.unwrap();

    assert!(served.fallback);
    assert_eq!(served.dpi, 0);
    assert_eq!(served.data, fallback);
}

#[tokio::test]
async fn test_missing_page_without_fallback_is_not_found() {
    let svc = service(MockSource::new(), ServiceConfig::default());
    let err = svc
        .serve_image(&ImageRequest::new(key("00ab9f", 3)))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_authentication_error_is_never_replaced() {
    let source = MockSource::new().with_error(
        "00ab9f",
        1,
        ImageError::Authentication("Invalid session".into()),
    );
    let svc = service(source, ServiceConfig::default()).with_default_image(plain_png(4, 4));

    let err = svc
        .serve_image(&ImageRequest::new(key("00ab9f", 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ImageError::Authentication(_)));
}

#[tokio::test]
async fn test_thumbnail_fallback_is_separate() {
    let thumb = plain_png(3, 3);
    let svc = service(MockSource::new(), ServiceConfig::default())
        .with_default_image(plain_png(10, 10))
        .with_default_thumbnail(thumb.clone());

    let served = svc.serve_thumbnail(&key("00ab9f", 1)).await.unwrap();
    assert!(served.fallback);
    assert_eq!(served.data, thumb);
}

// =============================================================================
// Derivations
// =============================================================================

#[tokio::test]
async fn test_scaling_to_stored_dpi_is_unchanged() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(120, 80, 150));
    let svc = service(source, ServiceConfig::default());

    let native = svc
        .render_image(&ImageRequest::new(key("AB12CD", 1)).with_dpi(0))
        .await
        .unwrap();
    let same = svc
        .render_image(&ImageRequest::new(key("AB12CD", 1)).with_dpi(150))
        .await
        .unwrap();

    assert_eq!(png_dimensions(&native.data), (120, 80));
    assert_eq!(png_dimensions(&same.data), (120, 80));
    assert_eq!(same.dpi, 150);
    assert!(same.cache_hit);
}

#[tokio::test]
async fn test_scaling_to_lower_dpi() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(300, 150, 300));
    let svc = service(source, ServiceConfig::default());

    let served = svc
        .render_image(&ImageRequest::new(key("AB12CD", 1)).with_dpi(100))
        .await
        .unwrap();
    assert!(!served.direct_copy);
    assert_eq!(served.dpi, 100);
    assert_eq!(png_dimensions(&served.data), (100, 50));
}

#[tokio::test]
async fn test_crop_single_box() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(200, 200, 100));
    let svc = service(source, no_margin());

    let request = ImageRequest::new(key("AB12CD", 1))
        .with_boxes(vec![BoundingBox::new(10, 60, 20, 40).unwrap()])
        .with_dpi(0);
    let served = svc.render_image(&request).await.unwrap();
    assert_eq!(png_dimensions(&served.data), (50, 20));
}

#[tokio::test]
async fn test_composite_vertical() {
    let source = MockSource::new()
        .with_page("AB12CD", 4, &sample_page(100, 100, 100))
        .with_page("AB12CD", 5, &sample_page(100, 100, 100));
    let svc = service(source, no_margin());

    let request = ImageRequest::new(key("AB12CD", 4))
        .with_boxes(BoundingBox::parse_list("[0,50,0,20][0,40,0,30]").unwrap())
        .with_dpi(0);
    let served = svc.render_image(&request).await.unwrap();

    assert!(is_png(&served.data));
    assert_eq!(png_dimensions(&served.data), (50, 50));
}

#[tokio::test]
async fn test_composite_horizontal() {
    let source = MockSource::new()
        .with_page("AB12CD", 1, &sample_page(100, 100, 100))
        .with_page("AB12CD", 2, &sample_page(100, 100, 100));
    let config = ServiceConfig {
        composite_axis: StackAxis::Horizontal,
        ..no_margin()
    };
    let svc = service(source, config);

    let request = ImageRequest::new(key("AB12CD", 1))
        .with_boxes(BoundingBox::parse_list("[0,50,0,20][0,40,0,30]").unwrap())
        .with_dpi(0);
    let served = svc.render_image(&request).await.unwrap();
    assert_eq!(png_dimensions(&served.data), (90, 30));
}

#[tokio::test]
async fn test_composite_missing_page_fails() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(100, 100, 100));
    let svc = service(source, no_margin());

    let request = ImageRequest::new(key("AB12CD", 1))
        .with_boxes(BoundingBox::parse_list("[0,50,0,20][0,40,0,30]").unwrap());
    let err = svc.render_image(&request).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_thumbnail_cached_separately() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(96, 48, 96));
    let svc = service(source.clone(), ServiceConfig::default());

    let first = svc.render_thumbnail(&key("AB12CD", 1)).await.unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.dpi, 24);
    assert_eq!(png_dimensions(&first.data), (24, 12));

    let second = svc.render_thumbnail(&key("AB12CD", 1)).await.unwrap();
    assert!(second.cache_hit);

    // Full page is still served and the source was only asked once
    let full = svc
        .render_image(&ImageRequest::new(key("AB12CD", 1)).with_dpi(0))
        .await
        .unwrap();
    assert!(full.cache_hit);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_get_page_image() {
    let source = MockSource::new().with_page("AB12CD", 2, &sample_page(30, 40, 72));
    let svc = service(source, ServiceConfig::default());

    let page = svc.get_page_image("AB12CD", 2).await.unwrap();
    assert_eq!((page.width(), page.height()), (30, 40));
    assert!(svc.get_page_image("AB", 2).await.is_err());
}

// =============================================================================
// Resolution Limits
// =============================================================================

#[tokio::test]
async fn test_excessive_dpi_is_rejected() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(40, 20, 96));
    let svc = service(source.clone(), ServiceConfig::default());

    let request = ImageRequest::from_params(key("AB12CD", 1), None, Some("4294967295")).unwrap();
    let err = svc.render_image(&request).await.unwrap_err();
    assert!(matches!(err, ImageError::InvalidRequest(_)));
    // Rejected before anything is fetched
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn test_excessive_dpi_served_as_fallback() {
    let fallback = plain_png(6, 6);
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(40, 20, 96));
    let svc = service(source, ServiceConfig::default()).with_default_image(fallback.clone());

    let request = ImageRequest::from_params(key("AB12CD", 1), None, Some("4294967295")).unwrap();
    let served = svc.serve_image(&request).await.unwrap();
    assert!(served.fallback);
    assert_eq!(served.data, fallback);
}

#[tokio::test]
async fn test_dpi_up_to_configured_maximum() {
    let source = MockSource::new().with_page("AB12CD", 1, &sample_page(40, 20, 100));
    let config = ServiceConfig {
        max_dpi: 200,
        ..ServiceConfig::default()
    };
    let svc = service(source, config);

    let served = svc
        .render_image(&ImageRequest::new(key("AB12CD", 1)).with_dpi(200))
        .await
        .unwrap();
    assert_eq!(png_dimensions(&served.data), (80, 40));

    let err = svc
        .render_image(&ImageRequest::new(key("AB12CD", 1)).with_dpi(201))
        .await
        .unwrap_err();
    assert!(matches!(err, ImageError::InvalidRequest(_)));
}
