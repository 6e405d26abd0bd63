//! Derivations: resolution scaling, cropping and multi-page composites.

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

use super::bbox::BoundingBox;
use super::page::{PageImage, PageImageMeta};
use crate::error::ImageError;

/// Upper bound on the pixel count of any scaled or composed image.
pub const MAX_IMAGE_PIXELS: u64 = 1 << 26;

/// Direction in which composite parts are stacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackAxis {
    /// Parts on top of each other (content continuing on the next page)
    #[default]
    Vertical,
    /// Parts side by side
    Horizontal,
}

impl FromStr for StackAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vertical" | "v" => Ok(StackAxis::Vertical),
            "horizontal" | "h" => Ok(StackAxis::Horizontal),
            other => Err(format!(
                "Invalid stacking axis '{}' (expected 'vertical' or 'horizontal')",
                other
            )),
        }
    }
}

impl fmt::Display for StackAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackAxis::Vertical => write!(f, "vertical"),
            StackAxis::Horizontal => write!(f, "horizontal"),
        }
    }
}

impl PageImage {
    /// Scale to the given resolution.
    ///
    /// `0` and the current resolution return an unchanged copy. A target that
    /// would exceed [`MAX_IMAGE_PIXELS`] is an `InvalidRequest`.
    pub fn scale_to_dpi(&self, dpi: u32) -> Result<PageImage, ImageError> {
        let current = self.current_dpi();
        if dpi == 0 || dpi == current || current == 0 {
            return Ok(self.clone());
        }

        let factor = dpi as f64 / current as f64;
        let width = (self.width() as f64 * factor).round().max(1.0);
        let height = (self.height() as f64 * factor).round().max(1.0);
        if width * height > MAX_IMAGE_PIXELS as f64 {
            return Err(ImageError::InvalidRequest(format!(
                "Scaling a {}x{} page from {} to {} dpi exceeds the size limit",
                self.width(),
                self.height(),
                current,
                dpi
            )));
        }
        let scaled = self
            .image()
            .resize_exact(width as u32, height as u32, FilterType::Triangle);

        let mut meta = self.meta().clone();
        meta.current_dpi = dpi;
        Ok(PageImage::with_meta(scaled, meta))
    }

    /// Cut out the region described by `bbox`, widened by `margin` pixels and
    /// clipped to the image.
    ///
    /// The box is in original-resolution coordinates of the uncropped page.
    pub fn sub_image(&self, bbox: &BoundingBox, margin: u32) -> Result<PageImage, ImageError> {
        let meta = self.meta();
        let scale = if meta.original_dpi == 0 {
            1.0
        } else {
            meta.current_dpi as f64 / meta.original_dpi as f64
        };
        let to_current =
            |value: u32, edge: u32| ((value as f64 - edge as f64) * scale).round() as i64;

        let margin = margin as i64;
        let width = self.width() as i64;
        let height = self.height() as i64;

        let x0 = (to_current(bbox.left, meta.left_edge) - margin).clamp(0, width);
        let x1 = (to_current(bbox.right, meta.left_edge) + margin).clamp(0, width);
        let y0 = (to_current(bbox.top, meta.top_edge) - margin).clamp(0, height);
        let y1 = (to_current(bbox.bottom, meta.top_edge) + margin).clamp(0, height);

        if x1 <= x0 || y1 <= y0 {
            return Err(ImageError::InvalidRequest(format!(
                "Bounding box {} lies outside the page",
                bbox
            )));
        }

        let (x, y) = (x0 as u32, y0 as u32);
        let (w, h) = ((x1 - x0) as u32, (y1 - y0) as u32);
        let cropped = self.image().crop_imm(x, y, w, h);

        let to_original = |value: u32| (value as f64 / scale).round() as u32;
        let left_edge = meta.left_edge.saturating_add(to_original(x));
        let top_edge = meta.top_edge.saturating_add(to_original(y));
        let sub_meta = PageImageMeta {
            left_edge,
            top_edge,
            right_edge: meta
                .original_width
                .saturating_sub(left_edge.saturating_add(to_original(w))),
            bottom_edge: meta
                .original_height
                .saturating_sub(top_edge.saturating_add(to_original(h))),
            ..meta.clone()
        };

        Ok(PageImage::with_meta(cropped, sub_meta))
    }
}

/// Assemble parts of consecutive pages into one image.
///
/// Parts are brought to the resolution of the first part, then stacked along
/// `axis` on a white background. The result is a native page of its own.
pub fn compose(parts: &[PageImage], axis: StackAxis) -> Result<PageImage, ImageError> {
    let first = parts
        .first()
        .ok_or_else(|| ImageError::InvalidRequest("Composite without parts".to_string()))?;
    let dpi = first.current_dpi();
    let scaled = parts
        .iter()
        .map(|p| p.scale_to_dpi(dpi))
        .collect::<Result<Vec<_>, _>>()?;

    let widths = scaled.iter().map(|p| u64::from(p.width()));
    let heights = scaled.iter().map(|p| u64::from(p.height()));
    let (width, height): (u64, u64) = match axis {
        StackAxis::Vertical => (widths.max().unwrap_or(0), heights.sum()),
        StackAxis::Horizontal => (widths.sum(), heights.max().unwrap_or(0)),
    };

    if width.saturating_mul(height) > MAX_IMAGE_PIXELS {
        return Err(ImageError::InvalidRequest(format!(
            "Composite of {}x{} pixels exceeds the size limit",
            width, height
        )));
    }
    // Both fit in u32 once the product is below the limit
    let (width, height) = (width as u32, height as u32);

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut offset: i64 = 0;
    for part in &scaled {
        let pixels = part.image().to_rgb8();
        match axis {
            StackAxis::Vertical => {
                imageops::replace(&mut canvas, &pixels, 0, offset);
                offset += part.height() as i64;
            }
            StackAxis::Horizontal => {
                imageops::replace(&mut canvas, &pixels, offset, 0);
                offset += part.width() as i64;
            }
        }
    }

    Ok(PageImage::new(
        DynamicImage::ImageRgb8(canvas),
        dpi,
        first.meta().source.clone(),
    ))
}
