use std::collections::BTreeSet;
use std::fmt;

use crate::error::ImageError;
use crate::imaging::{BoundingBox, ImageKey};

/// Largest number of pages an index page may list.
pub const MAX_INDEX_PAGES: usize = 1000;

// =============================================================================
// Image Request
// =============================================================================

/// A logical request for a rendered page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Page the request starts at
    pub key: ImageKey,

    /// Crop boxes; the i-th box applies to page `key.page() + i`
    pub boxes: Vec<BoundingBox>,

    /// Target resolution. `None` uses the configured default, `Some(0)` is native.
    pub dpi: Option<u32>,
}

impl ImageRequest {
    pub fn new(key: ImageKey) -> Self {
        Self {
            key,
            boxes: Vec::new(),
            dpi: None,
        }
    }

    pub fn with_boxes(mut self, boxes: Vec<BoundingBox>) -> Self {
        self.boxes = boxes;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    /// Build a request from textual parameters.
    ///
    /// A malformed `boxes` parameter is an error; an unparseable `dpi` is
    /// ignored so the default resolution applies.
    pub fn from_params(
        key: ImageKey,
        boxes: Option<&str>,
        dpi: Option<&str>,
    ) -> Result<Self, ImageError> {
        let boxes = match boxes {
            Some(text) => BoundingBox::parse_list(text)?,
            None => Vec::new(),
        };
        let dpi = dpi.and_then(|d| d.trim().parse::<u32>().ok());
        Ok(Self { key, boxes, dpi })
    }
}

// =============================================================================
// Page Spec
// =============================================================================

/// Page selector of a request path: one page, or a set for an index view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSpec {
    Single(u32),
    Pages(BTreeSet<u32>),
}

impl PageSpec {
    /// Parse `"<n>"` or a comma separated list of pages and inclusive ranges,
    /// e.g. `"1-3,5"`.
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        let invalid = || ImageError::InvalidRequest(format!("Invalid page specification: {}", s));

        if let Ok(page) = s.parse::<u32>() {
            return Ok(PageSpec::Single(page));
        }

        let mut pages = BTreeSet::new();
        for item in s.split(',') {
            let item = item.trim();
            let (first, last) = match item.split_once('-') {
                Some((a, b)) => (
                    a.trim().parse::<u32>().map_err(|_| invalid())?,
                    b.trim().parse::<u32>().map_err(|_| invalid())?,
                ),
                None => {
                    let page = item.parse::<u32>().map_err(|_| invalid())?;
                    (page, page)
                }
            };
            if first > last || (last - first) as usize >= MAX_INDEX_PAGES {
                return Err(invalid());
            }
            pages.extend(first..=last);
            if pages.len() > MAX_INDEX_PAGES {
                return Err(ImageError::InvalidRequest(format!(
                    "Page specification {} selects more than {} pages",
                    s, MAX_INDEX_PAGES
                )));
            }
        }
        Ok(PageSpec::Pages(pages))
    }

    /// Pages in ascending order.
    pub fn pages(&self) -> Vec<u32> {
        match self {
            PageSpec::Single(page) => vec![*page],
            PageSpec::Pages(pages) => pages.iter().copied().collect(),
        }
    }
}

impl fmt::Display for PageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSpec::Single(page) => write!(f, "{}", page),
            PageSpec::Pages(pages) => {
                let list: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", list.join(","))
            }
        }
    }
}
