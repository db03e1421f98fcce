//! Automatic thresholding and connected component labelling
//!
//! Threshold methods operate on a 256-bin histogram spanning the min..max of
//! the sampled pixels, the way 16-bit images are auto-thresholded in common
//! microscopy tools. A histogram level `L` separates bins `0..=L` (background)
//! from `L+1..` (objects on a dark background).

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of histogram bins used by every auto-threshold method
pub const HISTOGRAM_BINS: usize = 256;

/// Available automatic threshold methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    /// Iterative intermeans (IsoData variant)
    Default,
    /// Yen's maximum correlation criterion
    Yen,
    /// Otsu's between-class variance maximisation
    Otsu,
}

impl fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdMethod::Default => write!(f, "Default"),
            ThresholdMethod::Yen => write!(f, "Yen"),
            ThresholdMethod::Otsu => write!(f, "Otsu"),
        }
    }
}

/// Fixed-width histogram over the value range of a sample set
#[derive(Debug, Clone)]
pub struct Histogram {
    pub counts: Vec<u64>,
    pub min: f64,
    pub max: f64,
}

impl Histogram {
    /// Build a histogram from samples. Returns None when there are no samples.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut counts = vec![0u64; HISTOGRAM_BINS];
        let width = (max - min) / HISTOGRAM_BINS as f64;
        for &value in samples {
            let bin = if width > 0.0 {
                (((value - min) / width) as usize).min(HISTOGRAM_BINS - 1)
            } else {
                0
            };
            counts[bin] += 1;
        }

        Some(Self { counts, min, max })
    }

    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / HISTOGRAM_BINS as f64
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Lowest pixel value classified as object for a histogram level
    pub fn level_to_value(&self, level: usize) -> f64 {
        self.min + (level as f64 + 1.0) * self.bin_width()
    }
}

/// Compute the object threshold for a set of samples.
///
/// Pixels with value `>=` the returned threshold are objects (dark background).
/// A flat or empty sample set yields its single value (or 0.0).
pub fn auto_threshold(samples: &[f64], method: ThresholdMethod) -> f64 {
    let Some(histogram) = Histogram::from_samples(samples) else {
        return 0.0;
    };
    if (histogram.max - histogram.min).abs() < 1e-12 {
        return histogram.min;
    }

    let level = match method {
        ThresholdMethod::Default => isodata_level(&histogram.counts),
        ThresholdMethod::Yen => yen_level(&histogram.counts),
        ThresholdMethod::Otsu => otsu_level(&histogram.counts),
    };
    histogram.level_to_value(level)
}

/// Iterative intermeans level.
///
/// The first and last bins are ignored so saturated or cleared pixels do not
/// drag the means.
pub fn isodata_level(counts: &[u64]) -> usize {
    let mut data = counts.to_vec();
    let max_index = data.len() - 1;
    data[0] = 0;
    data[max_index] = 0;

    let mut min = 0;
    while data[min] == 0 && min < max_index {
        min += 1;
    }
    let mut max = max_index;
    while data[max] == 0 && max > 0 {
        max -= 1;
    }
    if min >= max {
        return data.len() / 2;
    }

    let mut moving = min;
    let mut result;
    loop {
        let (mut sum1, mut sum2, mut sum3, mut sum4) = (0.0, 0.0, 0.0, 0.0);
        for (i, &count) in data.iter().enumerate().take(moving + 1).skip(min) {
            sum1 += i as f64 * count as f64;
            sum2 += count as f64;
        }
        for (i, &count) in data.iter().enumerate().take(max + 1).skip(moving + 1) {
            sum3 += i as f64 * count as f64;
            sum4 += count as f64;
        }
        let low_mean = if sum2 > 0.0 { sum1 / sum2 } else { 0.0 };
        let high_mean = if sum4 > 0.0 { sum3 / sum4 } else { 0.0 };
        result = (low_mean + high_mean) / 2.0;
        moving += 1;
        if !((moving + 1) as f64 <= result && moving < max - 1) {
            break;
        }
    }

    (result.round() as usize).min(max_index)
}

/// Yen's maximum correlation level
pub fn yen_level(counts: &[u64]) -> usize {
    let bins = counts.len();
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return bins / 2;
    }
    let norm: Vec<f64> = counts.iter().map(|&c| c as f64 / total as f64).collect();

    let mut p1 = vec![0.0; bins];
    let mut p1_sq = vec![0.0; bins];
    p1[0] = norm[0];
    p1_sq[0] = norm[0] * norm[0];
    for i in 1..bins {
        p1[i] = p1[i - 1] + norm[i];
        p1_sq[i] = p1_sq[i - 1] + norm[i] * norm[i];
    }

    let mut p2_sq = vec![0.0; bins];
    for i in (0..bins - 1).rev() {
        p2_sq[i] = p2_sq[i + 1] + norm[i + 1] * norm[i + 1];
    }

    // Smallest positive value: level 0 unless some criterion is positive
    let mut level = 0;
    let mut max_crit = f64::from_bits(1);
    for t in 0..bins {
        let sq = p1_sq[t] * p2_sq[t];
        let spread = p1[t] * (1.0 - p1[t]);
        let crit = -(if sq > 0.0 { sq.ln() } else { 0.0 })
            + 2.0 * (if spread > 0.0 { spread.ln() } else { 0.0 });
        if crit > max_crit {
            max_crit = crit;
            level = t;
        }
    }
    level
}

/// Otsu's between-class variance level
pub fn otsu_level(counts: &[u64]) -> usize {
    let total = counts.iter().sum::<u64>() as f64;
    if total == 0.0 {
        return counts.len() / 2;
    }
    let total_weighted: f64 = counts
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut cum_count = 0.0;
    let mut cum_weighted = 0.0;
    let mut best_level = 0;
    let mut max_variance = 0.0;

    for (t, &count) in counts.iter().enumerate().take(counts.len() - 1) {
        cum_count += count as f64;
        cum_weighted += t as f64 * count as f64;

        let w_bg = cum_count / total;
        if w_bg == 0.0 || w_bg == 1.0 {
            continue;
        }
        let w_fg = 1.0 - w_bg;
        let mean_bg = cum_weighted / cum_count;
        let mean_fg = (total_weighted - cum_weighted) / (total - cum_count);

        let variance = w_bg * w_fg * (mean_bg - mean_fg).powi(2);
        if variance > max_variance {
            max_variance = variance;
            best_level = t;
        }
    }

    best_level
}

/// Binary mask of pixels inside the inclusive range `[lower, upper]`
pub fn apply_threshold(image: ArrayView2<f64>, lower: f64, upper: f64) -> Array2<bool> {
    image.mapv(|v| v >= lower && v <= upper)
}

/// Find connected components in a binary mask
///
/// Uses 8-connectivity flood fill. Labels are assigned in raster order of
/// each component's first pixel, starting at 1; 0 is background.
pub fn connected_components(mask: ArrayView2<bool>) -> (Array2<u32>, u32) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::zeros((rows, cols));
    let mut label_counter = 0;

    let neighbors = [
        (-1, -1), (-1, 0), (-1, 1),
        (0, -1),           (0, 1),
        (1, -1),  (1, 0),  (1, 1),
    ];

    for i in 0..rows {
        for j in 0..cols {
            if !mask[[i, j]] || labels[[i, j]] != 0 {
                continue;
            }
            label_counter += 1;
            labels[[i, j]] = label_counter;
            let mut stack = vec![(i, j)];

            while let Some((y, x)) = stack.pop() {
                for &(dy, dx) in &neighbors {
                    let ny = y as isize + dy;
                    let nx = x as isize + dx;
                    if ny < 0 || nx < 0 || ny >= rows as isize || nx >= cols as isize {
                        continue;
                    }
                    let (ny, nx) = (ny as usize, nx as usize);
                    if mask[[ny, nx]] && labels[[ny, nx]] == 0 {
                        labels[[ny, nx]] = label_counter;
                        stack.push((ny, nx));
                    }
                }
            }
        }
    }

    (labels, label_counter)
}
