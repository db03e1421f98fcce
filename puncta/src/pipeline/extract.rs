//! Column extraction from a channel's measurement table

use serde::{Deserialize, Serialize};

use super::detector::PunctumMeasurement;

/// The seven reported statistics as parallel columns, one entry per punctum
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntensityColumns {
    pub mean: Vec<f64>,
    pub mode: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub integrated_density: Vec<f64>,
    pub median: Vec<f64>,
    pub raw_integrated_density: Vec<f64>,
}

impl IntensityColumns {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Values of row `index` in report order
    pub fn row(&self, index: usize) -> Option<[f64; 7]> {
        if index >= self.len() {
            return None;
        }
        Some([
            self.mean[index],
            self.mode[index],
            self.min[index],
            self.max[index],
            self.integrated_density[index],
            self.median[index],
            self.raw_integrated_density[index],
        ])
    }
}

/// Extract every row, in table order
pub fn extract_columns(table: &[PunctumMeasurement]) -> IntensityColumns {
    let mut columns = IntensityColumns::default();
    for row in table {
        let s = &row.stats;
        columns.mean.push(s.mean);
        columns.mode.push(s.mode);
        columns.min.push(s.min);
        columns.max.push(s.max);
        columns.integrated_density.push(s.integrated_density);
        columns.median.push(s.median);
        columns.raw_integrated_density.push(s.raw_integrated_density);
    }
    columns
}
