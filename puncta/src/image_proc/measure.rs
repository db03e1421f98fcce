//! Intensity measurement over regions of interest

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use shared::{StatsError, StatsScan};

use super::roi::Roi;

/// Intensity statistics of one region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityStats {
    /// Number of pixels measured
    pub pixel_count: usize,
    /// Calibrated area (pixel_count × pixel area)
    pub area: f64,
    pub mean: f64,
    pub mode: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// Calibrated area × mean
    pub integrated_density: f64,
    /// Sum of pixel values
    pub raw_integrated_density: f64,
    /// Centroid x in pixels
    pub centroid_x: f64,
    /// Centroid y in pixels
    pub centroid_y: f64,
}

/// Measure intensity statistics of `image` over `roi`
///
/// Region pixels that fall outside the image are ignored; a region with no
/// pixel inside the image yields `StatsError::NoData`.
pub fn measure(
    image: ArrayView2<f64>,
    roi: &Roi,
    pixel_area: f64,
) -> Result<IntensityStats, StatsError> {
    let (rows, cols) = image.dim();
    let mut samples = Vec::with_capacity(roi.pixel_count());
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for (row, col) in roi.pixels() {
        if row < rows && col < cols {
            samples.push(image[[row, col]]);
            sum_x += col as f64 + 0.5;
            sum_y += row as f64 + 0.5;
        }
    }

    let scan = StatsScan::new(&samples);
    let (min, max, mean) = scan.min_max_mean()?;
    let raw_integrated_density = scan.sum()?;
    let count = scan.count();
    let area = count as f64 * pixel_area;

    Ok(IntensityStats {
        pixel_count: count,
        area,
        mean,
        mode: scan.mode(&samples)?,
        min,
        max,
        median: scan.median(&samples)?,
        integrated_density: area * mean,
        raw_integrated_density,
        centroid_x: sum_x / count as f64,
        centroid_y: sum_y / count as f64,
    })
}

/// Mean intensity of `image` over `roi`
pub fn mean_intensity(image: ArrayView2<f64>, roi: &Roi) -> Result<f64, StatsError> {
    let (rows, cols) = image.dim();
    let samples: Vec<f64> = roi
        .pixels()
        .filter(|&(r, c)| r < rows && c < cols)
        .map(|(r, c)| image[[r, c]])
        .collect();
    StatsScan::new(&samples).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_measure_all_statistics() {
        let image = arr2(&[
            [1.0, 2.0, 2.0],
            [4.0, 9.0, 0.0],
        ]);
        let roi = Roi::from_pixels(&[(0, 0), (0, 1), (0, 2), (1, 0), (1, 1)]).unwrap();

        let stats = measure(image.view(), &roi, 0.5).unwrap();

        assert_eq!(stats.pixel_count, 5);
        assert_relative_eq!(stats.area, 2.5);
        assert_relative_eq!(stats.mean, 18.0 / 5.0);
        assert_eq!(stats.mode, 2.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.median, 2.0);
        assert_relative_eq!(stats.raw_integrated_density, 18.0);
        assert_relative_eq!(stats.integrated_density, 2.5 * 18.0 / 5.0);
        assert_relative_eq!(stats.centroid_x, (0.5 + 1.5 + 2.5 + 0.5 + 1.5) / 5.0);
        assert_relative_eq!(stats.centroid_y, (0.5 * 3.0 + 1.5 * 2.0) / 5.0);
    }

    #[test]
    fn test_region_outside_image_has_no_data() {
        let image = arr2(&[[1.0, 2.0]]);
        let roi = Roi::from_pixels(&[(5, 5)]).unwrap();
        assert_eq!(measure(image.view(), &roi, 1.0), Err(StatsError::NoData));
        assert_eq!(mean_intensity(image.view(), &roi), Err(StatsError::NoData));
    }
}
