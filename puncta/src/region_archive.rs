//! Persisted punctum regions
//!
//! The definitive punctum set of every channel is written as one JSON
//! document next to the source image, named after the image with its dots
//! removed (`cell.01.tif` → `cell01tif.json`). Regions are stored as row runs
//! so they can be rebuilt exactly.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use shared::config_storage::{load_json_file, save_json_file};
use shared::ConfigError;

use crate::image_proc::{PixelRun, Roi, AABB};
use crate::pipeline::ChannelDetection;
use crate::stack::Channel;

/// One stored punctum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRegion {
    pub index: usize,
    pub bbox: AABB,
    pub pixel_count: usize,
    /// Calibrated area
    pub area: f64,
    pub centroid_x: f64,
    pub centroid_y: f64,
    /// Regrow sub-regions behind the measurement
    pub sub_regions: usize,
    pub runs: Vec<PixelRun>,
}

impl ArchivedRegion {
    pub fn to_roi(&self) -> Option<Roi> {
        Roi::from_runs(&self.runs)
    }
}

/// Puncta of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRegions {
    pub channel: Channel,
    pub threshold: f64,
    pub regions: Vec<ArchivedRegion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionArchive {
    /// Source image file name
    pub source: String,
    pub width: usize,
    pub height: usize,
    pub pixel_size_um: f64,
    /// Reference nucleus outline
    pub reference: Vec<PixelRun>,
    pub channels: Vec<ChannelRegions>,
}

/// `<parent_dir>/<title without dots>.json`
pub fn archive_path(parent_dir: &Path, title: &str) -> PathBuf {
    let name: String = title.chars().filter(|&c| c != '.').collect();
    parent_dir.join(format!("{name}.json"))
}

impl ChannelRegions {
    pub fn from_detection(detection: &ChannelDetection, pixel_area: f64) -> Self {
        let regions = detection
            .puncta
            .iter()
            .enumerate()
            .map(|(index, roi)| {
                let (centroid_x, centroid_y) = roi.centroid();
                let pixel_count = roi.pixel_count();
                ArchivedRegion {
                    index,
                    bbox: roi.bbox,
                    pixel_count,
                    area: pixel_count as f64 * pixel_area,
                    centroid_x,
                    centroid_y,
                    sub_regions: detection
                        .measurements
                        .get(index)
                        .map(|m| m.sub_regions)
                        .unwrap_or(0),
                    runs: roi.row_runs(),
                }
            })
            .collect();
        Self {
            channel: detection.channel,
            threshold: detection.threshold,
            regions,
        }
    }
}

impl RegionArchive {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelRegions> {
        self.channels.iter().find(|c| c.channel == channel)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        save_json_file(path, self)?;
        let count: usize = self.channels.iter().map(|c| c.regions.len()).sum();
        info!("Saved {count} punctum regions to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::IntensityStats;
    use crate::pipeline::PunctumMeasurement;
    use tempfile::TempDir;

    #[test]
    fn test_archive_name_drops_dots() {
        assert_eq!(
            archive_path(Path::new("/data/run1"), "cell.01.tif"),
            PathBuf::from("/data/run1/cell01tif.json")
        );
    }

    #[test]
    fn test_saved_regions_rebuild_exactly() {
        let ring = Roi::from_pixels(&[(4, 4), (4, 5), (4, 6), (5, 4), (5, 6), (6, 4), (6, 5), (6, 6)])
            .unwrap();
        let dot = Roi::from_pixels(&[(10, 2)]).unwrap();
        let stats = IntensityStats {
            pixel_count: 1,
            area: 0.01,
            mean: 9.0,
            mode: 9.0,
            min: 9.0,
            max: 9.0,
            median: 9.0,
            integrated_density: 0.09,
            raw_integrated_density: 9.0,
            centroid_x: 2.5,
            centroid_y: 10.5,
        };
        let detection = ChannelDetection {
            channel: Channel::FarRed,
            threshold: 42.0,
            puncta: vec![ring.clone(), dot],
            measurements: vec![
                PunctumMeasurement {
                    index: 0,
                    stats,
                    sub_regions: 2,
                },
                PunctumMeasurement {
                    index: 1,
                    stats,
                    sub_regions: 0,
                },
            ],
        };
        let archive = RegionArchive {
            source: "cell.tif".into(),
            width: 16,
            height: 16,
            pixel_size_um: 0.1,
            reference: ring.row_runs(),
            channels: vec![ChannelRegions::from_detection(&detection, 0.01)],
        };

        let temp = TempDir::new().unwrap();
        let path = archive_path(temp.path(), "cell.tif");
        archive.save(&path).unwrap();
        let loaded = RegionArchive::load(&path).unwrap();

        assert_eq!(loaded, archive);
        let far_red = loaded.channel(Channel::FarRed).unwrap();
        assert_eq!(far_red.regions[0].to_roi().unwrap(), ring);
        assert_eq!(far_red.regions[0].sub_regions, 2);
        assert_eq!(far_red.regions[0].runs.len(), 4);
        assert!((far_red.regions[1].area - 0.01).abs() < 1e-12);
        assert!(loaded.channel(Channel::Red).is_none());
    }
}
