//! Particle analysis: turn a thresholded mask into filtered regions.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::roi::Roi;
use super::thresholding::connected_components;

/// Inclusive area range in calibrated units (pixel count × pixel area)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaRange {
    pub min: f64,
    pub max: f64,
}

impl AreaRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Lower bound only
    pub fn at_least(min: f64) -> Self {
        Self {
            min,
            max: f64::INFINITY,
        }
    }

    pub fn contains(&self, area: f64) -> bool {
        area >= self.min && area <= self.max
    }
}

/// Filtering options applied to each connected component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleFilter {
    /// Accepted area range
    pub area: AreaRange,
    /// Area of one pixel in calibrated units; 1.0 measures in pixels
    pub pixel_area: f64,
    /// Drop particles that touch the image border
    pub exclude_edges: bool,
    /// Fill interior holes before measuring and reporting
    pub include_holes: bool,
}

impl ParticleFilter {
    pub fn new(area: AreaRange, pixel_area: f64) -> Self {
        Self {
            area,
            pixel_area,
            exclude_edges: false,
            include_holes: false,
        }
    }

    pub fn exclude_edges(mut self, exclude: bool) -> Self {
        self.exclude_edges = exclude;
        self
    }

    pub fn include_holes(mut self, include: bool) -> Self {
        self.include_holes = include;
        self
    }
}

/// Detect particles in a binary mask
///
/// When `within` is given, mask pixels outside that region are ignored.
/// Particles are returned in raster order of their first pixel.
///
/// # Arguments
/// * `mask` - Binary object mask (true = object)
/// * `within` - Optional restricting region
/// * `filter` - Area/edge/hole options
pub fn analyze_particles(
    mask: ArrayView2<bool>,
    within: Option<&Roi>,
    filter: &ParticleFilter,
) -> Vec<Roi> {
    let dim = mask.dim();
    let restricted: Array2<bool> = match within {
        Some(region) => {
            let mut limited = Array2::from_elem(dim, false);
            for (row, col) in region.pixels() {
                if row < dim.0 && col < dim.1 {
                    limited[[row, col]] = mask[[row, col]];
                }
            }
            limited
        }
        None => mask.to_owned(),
    };

    let (labels, num_labels) = connected_components(restricted.view());
    let mut pixel_lists: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_labels as usize];
    for ((row, col), &label) in labels.indexed_iter() {
        if label > 0 {
            pixel_lists[(label - 1) as usize].push((row, col));
        }
    }

    pixel_lists
        .iter()
        .filter_map(|pixels| Roi::from_pixels(pixels))
        .filter(|roi| !(filter.exclude_edges && roi.touches_edge(dim)))
        .map(|roi| {
            if filter.include_holes {
                roi.fill_holes()
            } else {
                roi
            }
        })
        .filter(|roi| filter.area.contains(roi.pixel_count() as f64 * filter.pixel_area))
        .collect()
}

/// Rasterize regions into a full-size binary mask image
pub fn rasterize(rois: &[Roi], dim: (usize, usize)) -> Array2<bool> {
    let mut mask = Array2::from_elem(dim, false);
    for roi in rois {
        roi.paint(&mut mask);
    }
    mask
}
