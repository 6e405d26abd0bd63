use std::fmt;

use crate::error::ImageError;

/// A rectangular region of a page in original-resolution pixel coordinates.
///
/// Textual form is `[left,right,top,bottom]`; several boxes are concatenated
/// without separators to address consecutive pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl BoundingBox {
    /// Create a box; `left < right` and `top < bottom` are required.
    pub fn new(left: u32, right: u32, top: u32, bottom: u32) -> Result<Self, ImageError> {
        if left >= right || top >= bottom {
            return Err(ImageError::InvalidRequest(format!(
                "Invalid bounding box: [{},{},{},{}]",
                left, right, top, bottom
            )));
        }
        Ok(Self {
            left,
            right,
            top,
            bottom,
        })
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Parse one box.
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        let invalid = || ImageError::InvalidRequest(format!("Invalid bounding box: {}", s));

        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(invalid)?;

        let values = inner
            .split(',')
            .map(|v| v.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        match values.as_slice() {
            [left, right, top, bottom] => Self::new(*left, *right, *top, *bottom),
            _ => Err(invalid()),
        }
    }

    /// Parse a concatenation of boxes, e.g. `[0,10,0,10][5,20,0,8]`.
    ///
    /// An empty string yields no boxes.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, ImageError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Vec::new());
        }

        let mut boxes = Vec::new();
        let mut rest = s;
        while !rest.is_empty() {
            let end = rest.find(']').ok_or_else(|| {
                ImageError::InvalidRequest(format!("Unterminated bounding box in: {}", s))
            })?;
            boxes.push(Self::parse(&rest[..=end])?);
            rest = rest[end + 1..].trim_start();
        }
        Ok(boxes)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{},{}]",
            self.left, self.right, self.top, self.bottom
        )
    }
}
