//! Image processing module for fluorescence channel analysis
//!
//! This module provides the image primitives the measurement pipeline is
//! built from: convolution and sharpening, automatic thresholding, particle
//! analysis, region geometry, intensity measurement and display rendering.

pub mod aabb;
pub mod convolve2d;
pub mod display;
pub mod measure;
pub mod roi;
pub mod segment;
pub mod thresholding;

// Re-export key functionality for easier access
pub use aabb::AABB;
pub use convolve2d::{convolve2d, gaussian_kernel, unsharp_mask, ConvolveMode, ConvolveOptions, FilterError};
pub use display::{enhance_contrast, DisplayRange};
pub use measure::{measure, mean_intensity, IntensityStats};
pub use roi::{Oval, PixelRun, Roi};
pub use segment::{analyze_particles, rasterize, AreaRange, ParticleFilter};
pub use thresholding::{apply_threshold, auto_threshold, connected_components, ThresholdMethod};
