use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheLookup, MemoryCache, Variant};
use crate::error::ImageError;
use crate::imaging::{compose, ImageKey, PageImage, PageImageMeta, StackAxis};
use crate::store::PageImageSource;

use super::request::ImageRequest;

/// Default resolution of full page images.
pub const DEFAULT_IMAGE_DPI: u32 = 96;

/// Default resolution of thumbnails.
pub const DEFAULT_THUMBNAIL_DPI: u32 = 24;

/// Default margin added around crop boxes, in target pixels.
pub const DEFAULT_CROP_MARGIN: u32 = 3;

/// Default upper bound on a requested resolution.
pub const DEFAULT_MAX_DPI: u32 = 1200;

// =============================================================================
// Configuration and Response
// =============================================================================

/// Rendering defaults of an [`ImageService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub image_dpi: u32,
    pub thumbnail_dpi: u32,
    pub crop_margin: u32,
    pub composite_axis: StackAxis,

    /// Requests above this resolution are rejected
    pub max_dpi: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            image_dpi: DEFAULT_IMAGE_DPI,
            thumbnail_dpi: DEFAULT_THUMBNAIL_DPI,
            crop_margin: DEFAULT_CROP_MARGIN,
            composite_axis: StackAxis::default(),
            max_dpi: DEFAULT_MAX_DPI,
        }
    }
}

/// A rendered image ready to be sent to a client.
#[derive(Debug, Clone)]
pub struct ServedImage {
    /// PNG stream
    pub data: Bytes,

    /// Served from the memory cache without fetching
    pub cache_hit: bool,

    /// Forwarded as fetched, without decode/re-encode
    pub direct_copy: bool,

    /// A configured fallback image stands in for the requested one
    pub fallback: bool,

    /// Resolution of `data`; 0 for fallback images
    pub dpi: u32,
}

// =============================================================================
// Image Service
// =============================================================================

/// Resolves image requests against a source and the memory cache.
///
/// ```text
///   request ──► memory cache ──(miss)──► source (disk cache ► remote / store)
///                    │
///        full page ──┼── crop ──┬── scale ──► PNG
///                    └── compose┘
/// ```
pub struct ImageService {
    source: Arc<dyn PageImageSource>,
    cache: MemoryCache,
    config: ServiceConfig,
    default_image: Option<Bytes>,
    default_thumbnail: Option<Bytes>,
}

impl ImageService {
    pub fn new(source: Arc<dyn PageImageSource>, cache: MemoryCache, config: ServiceConfig) -> Self {
        Self {
            source,
            cache,
            config,
            default_image: None,
            default_thumbnail: None,
        }
    }

    /// Fallback PNG for full page requests.
    pub fn with_default_image(mut self, png: Bytes) -> Self {
        self.default_image = Some(png);
        self
    }

    /// Fallback PNG for thumbnail requests.
    pub fn with_default_thumbnail(mut self, png: Bytes) -> Self {
        self.default_thumbnail = Some(png);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }

    pub fn source(&self) -> &Arc<dyn PageImageSource> {
        &self.source
    }

    pub async fn is_available(&self, key: &ImageKey) -> bool {
        self.source.is_available(key).await
    }

    /// Decoded full page at its stored resolution, for embedding viewers.
    pub async fn get_page_image(
        &self,
        doc_id: &str,
        page: u32,
    ) -> Result<Arc<PageImage>, ImageError> {
        let key = ImageKey::new(doc_id, page)?;
        Ok(self.load_full(&key).await?.image)
    }

    /// Render a request, applying the fallback image on failure.
    pub async fn serve_image(&self, request: &ImageRequest) -> Result<ServedImage, ImageError> {
        let result = self.render_image(request).await;
        self.with_fallback(result, Variant::Full)
    }

    /// Render a thumbnail, applying the fallback thumbnail on failure.
    pub async fn serve_thumbnail(&self, key: &ImageKey) -> Result<ServedImage, ImageError> {
        let result = self.render_thumbnail(key).await;
        self.with_fallback(result, Variant::Thumbnail)
    }

    /// Replace a failed result with the configured fallback for `variant`.
    ///
    /// Authentication failures are passed through untouched, as is any error
    /// when no fallback is configured.
    pub fn with_fallback(
        &self,
        result: Result<ServedImage, ImageError>,
        variant: Variant,
    ) -> Result<ServedImage, ImageError> {
        let err = match result {
            Ok(served) => return Ok(served),
            Err(err) if !err.allows_fallback() => return Err(err),
            Err(err) => err,
        };
        let fallback = match variant {
            Variant::Full => &self.default_image,
            Variant::Thumbnail => &self.default_thumbnail,
        };
        match fallback {
            Some(data) => {
                warn!(error = %err, variant = ?variant, "Serving fallback image");
                Ok(ServedImage {
                    data: data.clone(),
                    cache_hit: false,
                    direct_copy: false,
                    fallback: true,
                    dpi: 0,
                })
            }
            None => Err(err),
        }
    }

    /// Render a request without fallback.
    pub async fn render_image(&self, request: &ImageRequest) -> Result<ServedImage, ImageError> {
        let dpi = request.dpi.unwrap_or(self.config.image_dpi);
        if dpi > self.config.max_dpi {
            return Err(ImageError::InvalidRequest(format!(
                "Requested resolution of {} dpi exceeds the maximum of {} dpi",
                dpi, self.config.max_dpi
            )));
        }

        match request.boxes.as_slice() {
            [] => {
                let lookup = self.load_full(&request.key).await?;
                if let Some(raw) = &lookup.fetched {
                    if let Some(served) = direct_copy(raw, dpi)? {
                        debug!(key = %request.key, dpi = served.dpi, "Direct copy");
                        return Ok(served);
                    }
                }
                encode_at(&lookup.image, dpi, lookup.is_hit())
            }
            [bbox] => {
                let lookup = self.load_full(&request.key).await?;
                let part = lookup.image.sub_image(bbox, self.config.crop_margin)?;
                encode_at(&part, dpi, lookup.is_hit())
            }
            boxes => {
                let mut parts = Vec::with_capacity(boxes.len());
                let mut all_hits = true;
                for (offset, bbox) in boxes.iter().enumerate() {
                    let page = u32::try_from(offset)
                        .ok()
                        .and_then(|o| request.key.page().checked_add(o))
                        .ok_or_else(|| {
                            ImageError::InvalidRequest("Composite runs past the last page".into())
                        })?;
                    let lookup = self.load_full(&request.key.with_page(page)).await?;
                    all_hits &= lookup.is_hit();
                    parts.push(lookup.image.sub_image(bbox, self.config.crop_margin)?);
                }
                let composite = compose(&parts, self.config.composite_axis)?;
                debug!(key = %request.key, parts = parts.len(), "Composed multi-page image");
                encode_at(&composite, dpi, all_hits)
            }
        }
    }

    /// Render a thumbnail without fallback.
    pub async fn render_thumbnail(&self, key: &ImageKey) -> Result<ServedImage, ImageError> {
        let thumbnail_dpi = self.config.thumbnail_dpi;
        let lookup = self
            .cache
            .get_or_fetch(CacheKey::thumbnail(key.clone()), || async {
                let full = self.load_full(key).await?;
                Ok((Arc::new(full.image.scale_to_dpi(thumbnail_dpi)?), ()))
            })
            .await?;

        Ok(ServedImage {
            data: lookup.image.encode_png()?,
            cache_hit: lookup.is_hit(),
            direct_copy: false,
            fallback: false,
            dpi: lookup.image.current_dpi(),
        })
    }

    /// Full page through the memory cache. A fresh fetch also yields the raw
    /// encoded bytes so callers can forward them unchanged.
    async fn load_full(&self, key: &ImageKey) -> Result<CacheLookup<Bytes>, ImageError> {
        self.cache
            .get_or_fetch(CacheKey::full(key.clone()), || async {
                let data = self.source.fetch(key).await?;
                let image = PageImage::decode(&data)?;
                Ok((Arc::new(image), data))
            })
            .await
    }
}

impl std::fmt::Debug for ImageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageService")
            .field("source", &self.source.name())
            .field("cache", &self.cache)
            .field("config", &self.config)
            .field("default_image", &self.default_image.is_some())
            .field("default_thumbnail", &self.default_thumbnail.is_some())
            .finish()
    }
}

/// Load a fallback image in any supported format and re-encode it as PNG.
pub async fn load_fallback_image(path: &Path) -> Result<Bytes, ImageError> {
    let data = tokio::fs::read(path).await.map_err(|e| {
        ImageError::Storage(format!("Failed to read {}: {}", path.display(), e))
    })?;
    PageImage::from_image_bytes(&data, 0, None)?.encode_png()
}

/// Forward the PNG body of freshly fetched bytes when no scaling is needed.
fn direct_copy(raw: &Bytes, dpi: u32) -> Result<Option<ServedImage>, ImageError> {
    let (meta, body_offset) = PageImageMeta::parse(raw)?;
    if dpi != 0 && dpi != meta.current_dpi {
        return Ok(None);
    }
    Ok(Some(ServedImage {
        data: raw.slice(body_offset..),
        cache_hit: false,
        direct_copy: true,
        fallback: false,
        dpi: meta.current_dpi,
    }))
}

fn encode_at(image: &PageImage, dpi: u32, cache_hit: bool) -> Result<ServedImage, ImageError> {
    let data = if dpi == 0 || dpi == image.current_dpi() {
        image.encode_png()?
    } else {
        image.scale_to_dpi(dpi)?.encode_png()?
    };
    Ok(ServedImage {
        data,
        cache_hit,
        direct_copy: false,
        fallback: false,
        dpi: if dpi == 0 { image.current_dpi() } else { dpi },
    })
}
