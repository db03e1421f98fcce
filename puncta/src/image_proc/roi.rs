//! Regions of interest stored as a bounding box plus a local pixel mask.

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::aabb::AABB;

/// Elliptical selection described by its bounding rectangle in pixel units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Oval {
    /// Left edge (x of the bounding rectangle)
    pub x: f64,
    /// Top edge (y of the bounding rectangle)
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One horizontal run of region pixels, `start_col..=end_col` on `row`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRun {
    pub row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

/// A region of interest in image coordinates
///
/// `mask` has the shape of `bbox` and marks which pixels of the box belong
/// to the region. A region always holds at least one pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    pub bbox: AABB,
    pub mask: Array2<bool>,
}

impl Roi {
    /// Build a region from a list of (row, col) pixels
    pub fn from_pixels(pixels: &[(usize, usize)]) -> Option<Self> {
        let mut bbox = AABB::new();
        for &(row, col) in pixels {
            bbox.expand_to_include(row, col);
        }
        if !bbox.is_valid() {
            return None;
        }

        let mut mask = Array2::from_elem(bbox.shape(), false);
        for &(row, col) in pixels {
            mask[[row - bbox.min_row, col - bbox.min_col]] = true;
        }
        Some(Self { bbox, mask })
    }

    /// Extract the region carrying `label` from a labelled image
    pub fn from_label(labels: ArrayView2<u32>, label: u32) -> Option<Self> {
        let pixels: Vec<(usize, usize)> = labels
            .indexed_iter()
            .filter(|(_, &l)| l == label)
            .map(|(idx, _)| idx)
            .collect();
        Self::from_pixels(&pixels)
    }

    /// Build a region from every true pixel of a full-size mask
    pub fn from_mask(mask: ArrayView2<bool>) -> Option<Self> {
        let pixels: Vec<(usize, usize)> = mask
            .indexed_iter()
            .filter(|(_, &m)| m)
            .map(|(idx, _)| idx)
            .collect();
        Self::from_pixels(&pixels)
    }

    /// Rasterize an oval: a pixel belongs when its centre lies inside the ellipse.
    ///
    /// Returns None when no pixel centre of the (rows, cols) image falls inside.
    pub fn from_oval(oval: &Oval, dim: (usize, usize)) -> Option<Self> {
        let (rows, cols) = dim;
        if oval.width <= 0.0 || oval.height <= 0.0 {
            return None;
        }
        let rx = oval.width / 2.0;
        let ry = oval.height / 2.0;
        let cx = oval.x + rx;
        let cy = oval.y + ry;

        let row_lo = oval.y.floor().max(0.0) as usize;
        let row_hi = ((oval.y + oval.height).ceil().max(0.0) as usize).min(rows);
        let col_lo = oval.x.floor().max(0.0) as usize;
        let col_hi = ((oval.x + oval.width).ceil().max(0.0) as usize).min(cols);

        let mut pixels = Vec::new();
        for row in row_lo..row_hi {
            for col in col_lo..col_hi {
                let dx = (col as f64 + 0.5 - cx) / rx;
                let dy = (row as f64 + 0.5 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 {
                    pixels.push((row, col));
                }
            }
        }
        Self::from_pixels(&pixels)
    }

    /// Number of pixels in the region
    pub fn pixel_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.bbox.contains_point(row, col)
            && self.mask[[row - self.bbox.min_row, col - self.bbox.min_col]]
    }

    /// Region pixels as (row, col) in raster order
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let (r0, c0) = (self.bbox.min_row, self.bbox.min_col);
        self.mask
            .indexed_iter()
            .filter(|(_, &m)| m)
            .map(move |((r, c), _)| (r + r0, c + c0))
    }

    /// Centroid (x, y) in pixel units, measured from pixel centres
    pub fn centroid(&self) -> (f64, f64) {
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut n = 0.0;
        for (row, col) in self.pixels() {
            sum_x += col as f64 + 0.5;
            sum_y += row as f64 + 0.5;
            n += 1.0;
        }
        (sum_x / n, sum_y / n)
    }

    /// True if any region pixel lies on the border of a (rows, cols) image
    pub fn touches_edge(&self, dim: (usize, usize)) -> bool {
        let (rows, cols) = dim;
        self.pixels()
            .any(|(r, c)| r == 0 || c == 0 || r + 1 == rows || c + 1 == cols)
    }

    /// Check whether two regions share a pixel
    pub fn intersects(&self, other: &Roi) -> bool {
        self.bbox.overlaps(&other.bbox) && self.pixels().any(|(r, c)| other.contains(r, c))
    }

    /// Full-size mask of a (rows, cols) image with this region set
    pub fn to_mask(&self, dim: (usize, usize)) -> Array2<bool> {
        let mut full = Array2::from_elem(dim, false);
        self.paint(&mut full);
        full
    }

    /// Set this region's pixels in an existing full-size mask
    pub fn paint(&self, target: &mut Array2<bool>) {
        let (rows, cols) = target.dim();
        for (row, col) in self.pixels() {
            if row < rows && col < cols {
                target[[row, col]] = true;
            }
        }
    }

    /// Grow the region outward by `pixels` (Euclidean distance), clipped to the image
    pub fn enlarge(&self, pixels: usize, dim: (usize, usize)) -> Roi {
        if pixels == 0 {
            return self.clone();
        }
        let grown_box = self.bbox.padded(pixels, dim);
        let radius = pixels as i64;
        let offsets: Vec<(i64, i64)> = (-radius..=radius)
            .flat_map(|dy| (-radius..=radius).map(move |dx| (dy, dx)))
            .filter(|&(dy, dx)| dy * dy + dx * dx <= radius * radius)
            .collect();

        let mut mask = Array2::from_elem(grown_box.shape(), false);
        for (row, col) in self.pixels() {
            for &(dy, dx) in &offsets {
                let r = row as i64 + dy;
                let c = col as i64 + dx;
                if r < grown_box.min_row as i64
                    || c < grown_box.min_col as i64
                    || r > grown_box.max_row as i64
                    || c > grown_box.max_col as i64
                {
                    continue;
                }
                mask[[
                    r as usize - grown_box.min_row,
                    c as usize - grown_box.min_col,
                ]] = true;
            }
        }

        Roi {
            bbox: grown_box,
            mask,
        }
    }

    /// Fill background pockets that are fully enclosed by the region
    pub fn fill_holes(&self) -> Roi {
        let (h, w) = self.mask.dim();
        // Pad by one so the outside background is a single connected frame
        let mut outside = Array2::from_elem((h + 2, w + 2), false);
        let mut stack = vec![(0usize, 0usize)];
        outside[[0, 0]] = true;
        while let Some((r, c)) = stack.pop() {
            let candidates = [
                (r.wrapping_sub(1), c),
                (r + 1, c),
                (r, c.wrapping_sub(1)),
                (r, c + 1),
            ];
            for (nr, nc) in candidates {
                if nr >= h + 2 || nc >= w + 2 || outside[[nr, nc]] {
                    continue;
                }
                let is_region = nr >= 1 && nc >= 1 && nr <= h && nc <= w && self.mask[[nr - 1, nc - 1]];
                if !is_region {
                    outside[[nr, nc]] = true;
                    stack.push((nr, nc));
                }
            }
        }

        let interior = outside.slice(s![1..h + 1, 1..w + 1]);
        Roi {
            bbox: self.bbox,
            mask: interior.mapv(|o| !o),
        }
    }

    /// Union of several regions
    pub fn union(rois: &[Roi]) -> Option<Roi> {
        let pixels: Vec<(usize, usize)> = rois.iter().flat_map(|r| r.pixels()).collect();
        Self::from_pixels(&pixels)
    }

    /// Run-length encoding of the region, row by row
    pub fn row_runs(&self) -> Vec<PixelRun> {
        let mut runs = Vec::new();
        for (local_row, line) in self.mask.outer_iter().enumerate() {
            let row = local_row + self.bbox.min_row;
            let mut start: Option<usize> = None;
            for (local_col, &m) in line.iter().enumerate() {
                match (m, start) {
                    (true, None) => start = Some(local_col),
                    (false, Some(s)) => {
                        runs.push(PixelRun {
                            row,
                            start_col: s + self.bbox.min_col,
                            end_col: local_col - 1 + self.bbox.min_col,
                        });
                        start = None;
                    }
                    _ => {}
                }
            }
            if let Some(s) = start {
                runs.push(PixelRun {
                    row,
                    start_col: s + self.bbox.min_col,
                    end_col: line.len() - 1 + self.bbox.min_col,
                });
            }
        }
        runs
    }

    /// Rebuild a region from row runs
    pub fn from_runs(runs: &[PixelRun]) -> Option<Roi> {
        let pixels: Vec<(usize, usize)> = runs
            .iter()
            .flat_map(|run| (run.start_col..=run.end_col).map(move |c| (run.row, c)))
            .collect();
        Self::from_pixels(&pixels)
    }
}
