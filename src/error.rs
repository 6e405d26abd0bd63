use thiserror::Error;

/// Errors raised by the store, the wire protocol, the caches and the serving layer.
///
/// `NotFound` is an ordinary negative result rather than a failure; the serving
/// layer is the only place that turns any of these into a fallback image.
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    /// The requested page image does not exist (or the server could not produce it)
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Connection or I/O failure talking to the backing store
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unexpected or malformed response line
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid or absent session on upload
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Stored or received bytes are not a valid page image
    #[error("Decode error: {0}")]
    Decode(String),

    /// Failed to encode an image for storage or delivery
    #[error("Encode error: {0}")]
    Encode(String),

    /// Malformed key, page specification or crop parameter
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local filesystem failure inside a store or disk cache
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ImageError {
    /// Whether the serving layer may substitute a fallback image for this error.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, ImageError::Authentication(_))
    }

    /// Whether this is the plain "image absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ImageError::NotFound(_))
    }
}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        ImageError::Transport(err.to_string())
    }
}

impl From<image::ImageError> for ImageError {
    fn from(err: image::ImageError) -> Self {
        ImageError::Decode(err.to_string())
    }
}
