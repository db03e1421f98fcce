//! Axis-Aligned Bounding Box for region footprints.
//!
//! Every region of interest in the pipeline (nucleus candidates, puncta,
//! background ovals) stores its pixels relative to one of these boxes, so the
//! box is also the coordinate frame for the local masks.

use serde::{Deserialize, Serialize};

/// Axis-Aligned Bounding Box for 2D image regions.
///
/// Uses image coordinates (row, column) with inclusive bounds.
///
/// # Examples
///
/// ```rust
/// use puncta::image_proc::aabb::AABB;
///
/// let punctum = AABB::from_coords(100, 200, 102, 204);
/// assert_eq!(punctum.width(), 5);
/// assert_eq!(punctum.height(), 3);
/// assert_eq!(punctum.area(), 15);
/// assert!(punctum.contains_point(101, 203));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AABB {
    /// Minimum row (y) coordinate (inclusive)
    pub min_row: usize,
    /// Minimum column (x) coordinate (inclusive)
    pub min_col: usize,
    /// Maximum row (y) coordinate (inclusive)
    pub max_row: usize,
    /// Maximum column (x) coordinate (inclusive)
    pub max_col: usize,
}

impl AABB {
    /// Create a new empty AABB with invalid bounds.
    ///
    /// Becomes valid once a point is added via `expand_to_include()`.
    pub fn new() -> Self {
        Self {
            min_row: usize::MAX,
            min_col: usize::MAX,
            max_row: 0,
            max_col: 0,
        }
    }

    /// Create an AABB from explicit inclusive bounds.
    pub fn from_coords(min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
        }
    }

    /// Check if the bounds describe at least one pixel
    pub fn is_valid(&self) -> bool {
        self.min_row <= self.max_row && self.min_col <= self.max_col
    }

    /// Grow the box to include a pixel
    pub fn expand_to_include(&mut self, row: usize, col: usize) {
        self.min_row = self.min_row.min(row);
        self.min_col = self.min_col.min(col);
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
    }

    /// Width in pixels (columns)
    pub fn width(&self) -> usize {
        if self.is_valid() {
            self.max_col - self.min_col + 1
        } else {
            0
        }
    }

    /// Height in pixels (rows)
    pub fn height(&self) -> usize {
        if self.is_valid() {
            self.max_row - self.min_row + 1
        } else {
            0
        }
    }

    /// Number of pixels covered by the box
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn contains_point(&self, row: usize, col: usize) -> bool {
        row >= self.min_row && row <= self.max_row && col >= self.min_col && col <= self.max_col
    }

    /// Check if two boxes share any pixel
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.min_row <= other.max_row
            && self.max_row >= other.min_row
            && self.min_col <= other.max_col
            && self.max_col >= other.min_col
    }

    /// Expand by `padding` pixels on every side, clipped to a (rows, cols) image
    pub fn padded(&self, padding: usize, dim: (usize, usize)) -> Self {
        let (rows, cols) = dim;
        Self {
            min_row: self.min_row.saturating_sub(padding),
            min_col: self.min_col.saturating_sub(padding),
            max_row: (self.max_row + padding).min(rows.saturating_sub(1)),
            max_col: (self.max_col + padding).min(cols.saturating_sub(1)),
        }
    }

    /// Local array shape (rows, cols) of a mask spanning this box
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }
}

impl Default for AABB {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_from_empty() {
        let mut bbox = AABB::new();
        assert!(!bbox.is_valid());
        assert_eq!(bbox.area(), 0);

        bbox.expand_to_include(5, 7);
        bbox.expand_to_include(2, 9);
        assert!(bbox.is_valid());
        assert_eq!(bbox, AABB::from_coords(2, 7, 5, 9));
        assert_eq!(bbox.shape(), (4, 3));
    }

    #[test]
    fn test_overlap_includes_edge_contact() {
        let a = AABB::from_coords(0, 0, 4, 4);
        let b = AABB::from_coords(4, 4, 8, 8);
        let c = AABB::from_coords(5, 5, 8, 8);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&AABB::new()));
    }

    #[test]
    fn test_padded_is_clipped_to_image() {
        let bbox = AABB::from_coords(1, 8, 2, 9);
        let padded = bbox.padded(3, (10, 10));
        assert_eq!(padded, AABB::from_coords(0, 5, 5, 9));
    }
}
