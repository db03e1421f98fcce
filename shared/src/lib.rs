//! Shared components for the puncta analysis workspace

pub mod config_storage;
pub mod image_size;
pub mod stats_scan;

pub use config_storage::{ConfigError, ConfigStorage};
pub use image_size::ImageSize;
pub use stats_scan::{StatsError, StatsScan};
