//! StatsScan - intensity statistics over a set of pixel samples
//!
//! Range, sum and count come from a single pass at construction. Median and
//! mode need the samples themselves and sort a copy on demand.
//!
//! Median and mode follow histogram semantics for integer-valued images: the
//! median is the sample at sorted index `n / 2`, and the mode is the most
//! frequent value with ties resolved toward the lowest value.
//!
//! A NaN sample stops the scan; every accessor then reports where it was found.

use num_traits::float::Float;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("NaN sample at index {0}")]
    NaNEncountered(usize),
    #[error("No samples to measure")]
    NoData,
}

/// Single-pass summary of a sample slice
#[derive(Debug, Clone)]
pub struct StatsScan<T: Float> {
    /// (lowest, highest) seen so far
    range: Option<(T, T)>,
    total: T,
    samples: usize,
    first_nan: Option<usize>,
}

impl<T: Float + fmt::Debug> StatsScan<T> {
    /// Scan `data`, stopping at the first NaN
    pub fn new(data: &[T]) -> Self {
        let mut scan = Self {
            range: None,
            total: T::zero(),
            samples: 0,
            first_nan: None,
        };
        for (index, &value) in data.iter().enumerate() {
            if value.is_nan() {
                scan.first_nan = Some(index);
                break;
            }
            scan.total = scan.total + value;
            scan.samples += 1;
            scan.range = Some(match scan.range {
                None => (value, value),
                Some((lo, hi)) => (lo.min(value), hi.max(value)),
            });
        }
        scan
    }

    fn valid_range(&self) -> Result<(T, T), StatsError> {
        match (self.first_nan, self.range) {
            (Some(index), _) => Err(StatsError::NaNEncountered(index)),
            (None, None) => Err(StatsError::NoData),
            (None, Some(range)) => Ok(range),
        }
    }

    pub fn min(&self) -> Result<T, StatsError> {
        self.valid_range().map(|(lo, _)| lo)
    }

    pub fn max(&self) -> Result<T, StatsError> {
        self.valid_range().map(|(_, hi)| hi)
    }

    /// (min, max)
    pub fn min_max(&self) -> Result<(T, T), StatsError> {
        self.valid_range()
    }

    pub fn mean(&self) -> Result<T, StatsError> {
        self.valid_range()?;
        let n = T::from(self.samples).ok_or(StatsError::NoData)?;
        Ok(self.total / n)
    }

    /// Sum of all samples (raw integrated density for a region)
    pub fn sum(&self) -> Result<T, StatsError> {
        self.valid_range()?;
        Ok(self.total)
    }

    /// Number of samples scanned before any NaN
    pub fn count(&self) -> usize {
        self.samples
    }

    pub fn has_nan(&self) -> bool {
        self.first_nan.is_some()
    }

    /// (min, max, mean)
    pub fn min_max_mean(&self) -> Result<(T, T, T), StatsError> {
        let (lo, hi) = self.valid_range()?;
        Ok((lo, hi, self.mean()?))
    }

    fn sorted(&self, data: &[T]) -> Result<Vec<T>, StatsError> {
        self.valid_range()?;
        let mut sorted = data[..self.samples.min(data.len())].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        if sorted.is_empty() {
            return Err(StatsError::NoData);
        }
        Ok(sorted)
    }

    /// Upper-middle sample; `data` must be the slice given to `new()`
    pub fn median(&self, data: &[T]) -> Result<T, StatsError> {
        let sorted = self.sorted(data)?;
        Ok(sorted[sorted.len() / 2])
    }

    /// Most frequent sample, lowest on ties; `data` must be the slice given to `new()`
    pub fn mode(&self, data: &[T]) -> Result<T, StatsError> {
        let sorted = self.sorted(data)?;
        let mut best = (sorted[0], 0usize);
        for run in sorted.chunk_by(|a, b| a == b) {
            if run.len() > best.1 {
                best = (run[0], run.len());
            }
        }
        Ok(best.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_summary() {
        let pixels = [120.0_f64, 98.0, 131.0, 98.0, 140.0, 101.0];
        let scan = StatsScan::new(&pixels);

        assert_eq!(scan.count(), 6);
        assert_eq!(scan.min_max().unwrap(), (98.0, 140.0));
        assert_eq!(scan.sum().unwrap(), 688.0);
        assert!((scan.mean().unwrap() - 688.0 / 6.0).abs() < 1e-12);
        assert_eq!(scan.median(&pixels).unwrap(), 120.0);
        assert_eq!(scan.mode(&pixels).unwrap(), 98.0);
    }

    #[test]
    fn test_median_takes_upper_middle_for_even_counts() {
        let data = [4.0_f64, 1.0, 3.0, 2.0];
        assert_eq!(StatsScan::new(&data).median(&data).unwrap(), 3.0);

        let odd = [7.0_f64, 1.0, 5.0];
        assert_eq!(StatsScan::new(&odd).median(&odd).unwrap(), 5.0);
    }

    #[test]
    fn test_mode_prefers_lowest_on_ties() {
        let data = [5.0_f64, 2.0, 5.0, 2.0, 9.0];
        assert_eq!(StatsScan::new(&data).mode(&data).unwrap(), 2.0);

        let data = [8.0_f64, 8.0, 8.0, 1.0, 1.0];
        assert_eq!(StatsScan::new(&data).mode(&data).unwrap(), 8.0);
    }

    #[test]
    fn test_nan_poisons_every_statistic() {
        let data = [10.0_f32, 12.0, f32::NAN, 14.0];
        let scan = StatsScan::new(&data);

        assert!(scan.has_nan());
        assert_eq!(scan.count(), 2);
        assert_eq!(scan.max(), Err(StatsError::NaNEncountered(2)));
        assert_eq!(scan.sum(), Err(StatsError::NaNEncountered(2)));
        assert_eq!(scan.median(&data), Err(StatsError::NaNEncountered(2)));
    }

    #[test]
    fn test_empty_region() {
        let scan = StatsScan::<f64>::new(&[]);
        assert_eq!(scan.min_max_mean(), Err(StatsError::NoData));
        assert_eq!(scan.mode(&[]), Err(StatsError::NoData));
        assert!(!scan.has_nan());
    }
}
