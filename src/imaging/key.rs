//! Page image identifiers.

use std::fmt;
use std::sync::Arc;

use crate::error::ImageError;

/// Minimum document id length; the store layout consumes the first four characters.
pub const MIN_DOC_ID_LEN: usize = 4;

/// Canonical identifier of one stored page image: `(document id, page number)`.
///
/// Rendered as `"<documentId>.<pageNumber>"`, both on the wire and in file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey {
    doc_id: Arc<str>,
    page: u32,
}

impl ImageKey {
    /// Create a key, validating the document id.
    pub fn new(doc_id: impl AsRef<str>, page: u32) -> Result<Self, ImageError> {
        let doc_id = doc_id.as_ref();
        validate_doc_id(doc_id)?;
        Ok(Self {
            doc_id: Arc::from(doc_id),
            page,
        })
    }

    /// Parse the canonical `"<documentId>.<pageNumber>"` form.
    ///
    /// The split happens at the last `.`.
    pub fn parse(name: &str) -> Result<Self, ImageError> {
        let (doc_id, page) = name
            .rsplit_once('.')
            .ok_or_else(|| ImageError::InvalidRequest(format!("Invalid image name: {}", name)))?;
        let page = page
            .parse::<u32>()
            .map_err(|_| ImageError::InvalidRequest(format!("Invalid page number in: {}", name)))?;
        Self::new(doc_id, page)
    }

    /// The document id.
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// The page number.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// The key of another page of the same document.
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            doc_id: Arc::clone(&self.doc_id),
            page,
        }
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.doc_id, self.page)
    }
}

fn validate_doc_id(doc_id: &str) -> Result<(), ImageError> {
    if doc_id.len() < MIN_DOC_ID_LEN {
        return Err(ImageError::InvalidRequest(format!(
            "Document id too short: {:?} (need at least {} characters)",
            doc_id, MIN_DOC_ID_LEN
        )));
    }
    let valid = doc_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ImageError::InvalidRequest(format!(
            "Invalid characters in document id: {:?}",
            doc_id
        )));
    }
    Ok(())
}
