//! Pipeline configuration
//!
//! Every tunable of the measurement procedure lives in [`PipelineConfig`].
//! Defaults reproduce the established protocol; a JSON file can override any
//! subset of fields and command-line flags override the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared::config_storage::load_json_file;
use shared::{ConfigError, ConfigStorage};
use thiserror::Error;

use crate::image_proc::{AreaRange, ThresholdMethod};
use crate::stack::{validate_channel_order, Channel};

/// Smallest nucleus candidate, in pixels (uncalibrated)
pub const NUCLEUS_MIN_AREA_PX: f64 = 150.0;
/// Punctum area range in calibrated units (µm² when a pixel size is set)
pub const PUNCTUM_AREA_MIN: f64 = 0.02;
pub const PUNCTUM_AREA_MAX: f64 = 3.00;
/// Unsharp mask Gaussian radius in pixels
pub const UNSHARP_RADIUS: f64 = 1.0;
/// Unsharp mask weight
pub const UNSHARP_WEIGHT: f64 = 0.80;
/// Outward growth of each punctum before re-measurement, in pixels
pub const ENLARGE_PIXELS: usize = 3;
/// Lower intensity bound of the regrow threshold
pub const REGROW_THRESHOLD: f64 = 3.0;
/// Pixel width assumed when neither the configuration nor the image is calibrated
pub const UNCALIBRATED_PIXEL_SIZE: f64 = 1.0;
/// Percentage of pixels saturated by the display contrast
pub const CONTRAST_SATURATION: f64 = 0.35;
/// Default results file
pub const DEFAULT_RESULTS_FILE: &str = "Results.txt";
/// Name of the stored default configuration document
pub const CONFIG_DOCUMENT: &str = "pipeline";

#[derive(Error, Debug)]
pub enum PipelineConfigError {
    #[error(transparent)]
    Storage(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables of the measurement pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stack plane → channel mapping
    pub channel_order: Vec<Channel>,
    /// Physical pixel width in µm; overrides the image's own calibration when set
    pub pixel_size_um: Option<f64>,
    /// Nucleus auto-threshold method
    pub nucleus_threshold: ThresholdMethod,
    /// Minimum nucleus area in pixels
    pub nucleus_min_area_px: f64,
    /// Punctum auto-threshold method
    pub punctum_threshold: ThresholdMethod,
    /// Accepted punctum area (calibrated)
    pub punctum_area: AreaRange,
    pub unsharp_radius: f64,
    pub unsharp_weight: f64,
    pub enlarge_pixels: usize,
    pub regrow_threshold: f64,
    /// Measure on the sharpened channel (as detection does) rather than the raw one
    pub measure_sharpened: bool,
    pub contrast_saturation: f64,
    /// Append-only results file
    pub results_path: PathBuf,
    /// Directory for display previews; none written when unset
    pub preview_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_order: Channel::ALL.to_vec(),
            pixel_size_um: None,
            nucleus_threshold: ThresholdMethod::Default,
            nucleus_min_area_px: NUCLEUS_MIN_AREA_PX,
            punctum_threshold: ThresholdMethod::Yen,
            punctum_area: AreaRange::new(PUNCTUM_AREA_MIN, PUNCTUM_AREA_MAX),
            unsharp_radius: UNSHARP_RADIUS,
            unsharp_weight: UNSHARP_WEIGHT,
            enlarge_pixels: ENLARGE_PIXELS,
            regrow_threshold: REGROW_THRESHOLD,
            measure_sharpened: true,
            contrast_saturation: CONTRAST_SATURATION,
            results_path: PathBuf::from(DEFAULT_RESULTS_FILE),
            preview_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Pixel width in µm, or [`UNCALIBRATED_PIXEL_SIZE`] when unset
    pub fn pixel_size(&self) -> f64 {
        self.pixel_size_um.unwrap_or(UNCALIBRATED_PIXEL_SIZE)
    }

    /// Area of one pixel in calibrated units
    pub fn pixel_area(&self) -> f64 {
        let size = self.pixel_size();
        size * size
    }

    /// Copy with the pixel size fixed: configured value, else `image_pixel_size`, else uncalibrated
    pub fn calibrated(&self, image_pixel_size: Option<f64>) -> Self {
        let mut config = self.clone();
        config.pixel_size_um = Some(
            self.pixel_size_um
                .or(image_pixel_size)
                .unwrap_or(UNCALIBRATED_PIXEL_SIZE),
        );
        config
    }

    /// Read a configuration file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, PipelineConfigError> {
        let config: Self = load_json_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Stored default configuration, or built-in defaults when none is stored
    pub fn from_storage(storage: &ConfigStorage) -> Result<Self, PipelineConfigError> {
        match storage.load::<Self>(CONFIG_DOCUMENT) {
            Some(loaded) => {
                let config = loaded?;
                config.validate()?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineConfigError> {
        validate_channel_order(&self.channel_order)
            .map_err(|e| PipelineConfigError::Invalid(e.to_string()))?;
        if let Some(size) = self.pixel_size_um {
            if !(size > 0.0) {
                return Err(PipelineConfigError::Invalid(format!(
                    "pixel size must be positive, got {size}"
                )));
            }
        }
        if self.punctum_area.min > self.punctum_area.max {
            return Err(PipelineConfigError::Invalid(format!(
                "punctum area range {}..{} is empty",
                self.punctum_area.min, self.punctum_area.max
            )));
        }
        if !(0.0..1.0).contains(&self.unsharp_weight) {
            return Err(PipelineConfigError::Invalid(format!(
                "unsharp weight must be in [0, 1), got {}",
                self.unsharp_weight
            )));
        }
        if !(self.unsharp_radius > 0.0) {
            return Err(PipelineConfigError::Invalid(format!(
                "unsharp radius must be positive, got {}",
                self.unsharp_radius
            )));
        }
        if !(0.0..50.0).contains(&self.contrast_saturation) {
            return Err(PipelineConfigError::Invalid(format!(
                "contrast saturation must be in [0, 50), got {}",
                self.contrast_saturation
            )));
        }
        Ok(())
    }
}
