//! Reference nucleus selection
//!
//! The nucleus channel is thresholded (dark background), every connected
//! region of at least the configured pixel area that does not touch the
//! image border becomes a candidate, and exactly one candidate survives as
//! the spatial basis for all punctum measurements.

use std::path::Path;

use log::{debug, info};
use shared::StatsScan;

use super::{preview, PipelineError};
use crate::config::PipelineConfig;
use crate::image_proc::{analyze_particles, apply_threshold, auto_threshold, AreaRange, ParticleFilter, Roi};
use crate::selection::{CandidateSummary, SelectionProvider};
use crate::stack::{Channel, ChannelImage, ChannelStack};

/// The selected nucleus
#[derive(Debug, Clone)]
pub struct ReferenceRegion {
    pub roi: Roi,
    /// Nucleus threshold in effect when the candidates were detected
    pub threshold: f64,
    /// Index of the chosen candidate
    pub index: usize,
    pub candidate_count: usize,
}

/// Nucleus candidates at `threshold`, in raster order
///
/// Areas are counted in pixels regardless of calibration.
pub fn nucleus_candidates(image: &ChannelImage, threshold: f64, min_area_px: f64) -> Vec<Roi> {
    let mask = apply_threshold(image.pixels.view(), threshold, f64::INFINITY);
    let filter = ParticleFilter::new(AreaRange::at_least(min_area_px), 1.0)
        .exclude_edges(true)
        .include_holes(true);
    analyze_particles(mask.view(), None, &filter)
}

fn summarize(candidates: &[Roi]) -> Vec<CandidateSummary> {
    candidates
        .iter()
        .enumerate()
        .map(|(index, roi)| {
            let (centroid_x, centroid_y) = roi.centroid();
            CandidateSummary {
                index,
                area_px: roi.pixel_count(),
                centroid_x,
                centroid_y,
            }
        })
        .collect()
}

/// Threshold the nucleus channel and settle on one reference region
///
/// A single candidate is taken without consulting `provider`. When
/// `preview_dir` is set and several candidates exist, an outline overlay is
/// written there before the operator is asked to choose.
pub fn select_reference_region(
    stack: &ChannelStack,
    config: &PipelineConfig,
    provider: &mut dyn SelectionProvider,
    preview_dir: Option<&Path>,
) -> Result<ReferenceRegion, PipelineError> {
    let nucleus = stack.channel(Channel::Nucleus);
    let samples: Vec<f64> = nucleus.pixels.iter().copied().collect();
    let range = StatsScan::new(&samples).min_max()?;

    let proposed = auto_threshold(&samples, config.nucleus_threshold);
    let threshold = provider.refine_nucleus_threshold(proposed, range)?;
    debug!(
        "Nucleus threshold: proposed {proposed:.1} ({}), using {threshold:.1}",
        config.nucleus_threshold
    );

    let candidates = nucleus_candidates(nucleus, threshold, config.nucleus_min_area_px);
    let candidate_count = candidates.len();
    info!("{candidate_count} nucleus candidate(s) of at least {} px", config.nucleus_min_area_px);

    let index = match candidate_count {
        0 => return Err(PipelineError::NoReferenceRegion { threshold }),
        1 => 0,
        count => {
            if let Some(dir) = preview_dir {
                preview::write_candidate_overlay(stack, &candidates, dir);
            }
            let index = provider.pick_reference(&summarize(&candidates))?;
            if index >= count {
                return Err(PipelineError::InvalidSelection { index, count });
            }
            index
        }
    };

    let roi = candidates
        .into_iter()
        .nth(index)
        .ok_or(PipelineError::InvalidSelection {
            index,
            count: candidate_count,
        })?;
    info!(
        "Reference nucleus {index}: {} px at {:?}",
        roi.pixel_count(),
        roi.bbox
    );
    Ok(ReferenceRegion {
        roi,
        threshold,
        index,
        candidate_count,
    })
}
