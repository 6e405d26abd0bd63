//! Page images and their binary representation.
//!
//! The same byte layout is used for store files, disk cache files and wire
//! payloads: a fixed-size metadata header, the originating source name, then a
//! complete PNG stream.
//!
//! ```text
//! "PGIM" | version u8 | orig w | orig h | orig dpi | cur dpi |
//! left | right | top | bottom | source len u16 | source utf8 | PNG ...
//! ```
//!
//! All integers are big endian. Because the pixel data is a self-contained PNG
//! stream, callers that only need to forward the image can parse the header
//! with [`PageImageMeta::parse`] and slice off the body without decoding it.

use std::io::Cursor;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::ImageError;

/// File extension and pixel encoding shared by both ends of the wire protocol.
pub const IMAGE_FORMAT: &str = "png";

/// Leading bytes of every encoded page image.
pub const MAGIC: &[u8; 4] = b"PGIM";

/// Current header version.
pub const FORMAT_VERSION: u8 = 1;

/// Header size without the variable-length source name.
pub const FIXED_HEADER_LEN: usize = 4 + 1 + 8 * 4 + 2;

// =============================================================================
// Metadata
// =============================================================================

/// Resolution and crop metadata carried alongside the pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImageMeta {
    /// Width of the uncropped page at original resolution
    pub original_width: u32,

    /// Height of the uncropped page at original resolution
    pub original_height: u32,

    /// Resolution the page was scanned/rendered at
    pub original_dpi: u32,

    /// Resolution of the pixel data
    pub current_dpi: u32,

    /// Pixels (original resolution) cut away on the left
    pub left_edge: u32,

    /// Pixels (original resolution) cut away on the right
    pub right_edge: u32,

    /// Pixels (original resolution) cut away at the top
    pub top_edge: u32,

    /// Pixels (original resolution) cut away at the bottom
    pub bottom_edge: u32,

    /// Name of the store the image originates from
    pub source: Option<Arc<str>>,
}

impl PageImageMeta {
    /// Metadata for an uncropped image at its native resolution.
    pub fn native(width: u32, height: u32, dpi: u32, source: Option<Arc<str>>) -> Self {
        Self {
            original_width: width,
            original_height: height,
            original_dpi: dpi,
            current_dpi: dpi,
            left_edge: 0,
            right_edge: 0,
            top_edge: 0,
            bottom_edge: 0,
            source,
        }
    }

    /// Parse a header from the front of `data`.
    ///
    /// Returns the metadata and the offset at which the PNG body starts.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ImageError> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(ImageError::Decode(format!(
                "Truncated page image header: {} bytes, need at least {}",
                data.len(),
                FIXED_HEADER_LEN
            )));
        }

        let mut buf = data;
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(ImageError::Decode(format!(
                "Invalid page image magic: {:02X?}",
                magic
            )));
        }

        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(ImageError::Decode(format!(
                "Unsupported page image version: {}",
                version
            )));
        }

        let original_width = buf.get_u32();
        let original_height = buf.get_u32();
        let original_dpi = buf.get_u32();
        let current_dpi = buf.get_u32();
        let left_edge = buf.get_u32();
        let right_edge = buf.get_u32();
        let top_edge = buf.get_u32();
        let bottom_edge = buf.get_u32();

        let source_len = buf.get_u16() as usize;
        if buf.remaining() < source_len {
            return Err(ImageError::Decode(format!(
                "Truncated source name: need {} bytes, {} left",
                source_len,
                buf.remaining()
            )));
        }
        let source = std::str::from_utf8(&buf[..source_len])
            .map_err(|e| ImageError::Decode(format!("Invalid source name: {}", e)))?;
        let source = (!source.is_empty()).then(|| Arc::from(source));

        let meta = Self {
            original_width,
            original_height,
            original_dpi,
            current_dpi,
            left_edge,
            right_edge,
            top_edge,
            bottom_edge,
            source,
        };
        Ok((meta, FIXED_HEADER_LEN + source_len))
    }

    /// Append the encoded header to `out`.
    pub fn write_to(&self, out: &mut BytesMut) -> Result<(), ImageError> {
        let source = self.source.as_deref().unwrap_or("");
        let source_len = u16::try_from(source.len())
            .map_err(|_| ImageError::Encode("Source name too long".to_string()))?;

        out.reserve(FIXED_HEADER_LEN + source.len());
        out.put_slice(MAGIC);
        out.put_u8(FORMAT_VERSION);
        out.put_u32(self.original_width);
        out.put_u32(self.original_height);
        out.put_u32(self.original_dpi);
        out.put_u32(self.current_dpi);
        out.put_u32(self.left_edge);
        out.put_u32(self.right_edge);
        out.put_u32(self.top_edge);
        out.put_u32(self.bottom_edge);
        out.put_u16(source_len);
        out.put_slice(source.as_bytes());
        Ok(())
    }
}

// =============================================================================
// Page Image
// =============================================================================

/// Decoded pixels plus metadata. Immutable; derivations build new instances.
#[derive(Debug, Clone)]
pub struct PageImage {
    image: DynamicImage,
    meta: PageImageMeta,
}

impl PageImage {
    /// Wrap freshly acquired pixels at their native resolution.
    pub fn new(image: DynamicImage, dpi: u32, source: Option<Arc<str>>) -> Self {
        let meta = PageImageMeta::native(image.width(), image.height(), dpi, source);
        Self { image, meta }
    }

    /// Combine pixels with existing metadata.
    pub fn with_meta(image: DynamicImage, meta: PageImageMeta) -> Self {
        Self { image, meta }
    }

    /// Load an image file in any supported format (PNG, JPEG) as a native page.
    pub fn from_image_bytes(
        data: &[u8],
        dpi: u32,
        source: Option<Arc<str>>,
    ) -> Result<Self, ImageError> {
        let image = image::load_from_memory(data)?;
        Ok(Self::new(image, dpi, source))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn meta(&self) -> &PageImageMeta {
        &self.meta
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn current_dpi(&self) -> u32 {
        self.meta.current_dpi
    }

    /// Encode to the full binary representation (header + PNG).
    pub fn encode(&self) -> Result<Bytes, ImageError> {
        let png = self.encode_png()?;
        let mut out = BytesMut::with_capacity(FIXED_HEADER_LEN + png.len() + 64);
        self.meta.write_to(&mut out)?;
        out.put_slice(&png);
        Ok(out.freeze())
    }

    /// Encode only the pixels as a PNG stream.
    pub fn encode_png(&self) -> Result<Bytes, ImageError> {
        let mut output = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
        Ok(Bytes::from(output))
    }

    /// Decode the full binary representation.
    pub fn decode(data: &[u8]) -> Result<Self, ImageError> {
        let (meta, body_offset) = PageImageMeta::parse(data)?;
        let image = decode_png(&data[body_offset..])?;
        Ok(Self { image, meta })
    }
}

/// Decode a PNG body.
pub fn decode_png(body: &[u8]) -> Result<DynamicImage, ImageError> {
    let reader = ImageReader::with_format(Cursor::new(body), ImageFormat::Png);
    reader
        .decode()
        .map_err(|e| ImageError::Decode(e.to_string()))
}
