//! Measurement pipeline
//!
//! One run over a loaded stack:
//!
//! 1. background ovals sampled in Green, Red, FarRed
//! 2. one reference nucleus selected from the nucleus channel
//! 3. Red, Green, FarRed each sharpened, detected and measured inside the
//!    reference nucleus, with rows appended to the results file as each
//!    channel completes
//! 4. the definitive punctum sets of all channels archived next to the image
//!
//! Results-file write failures are logged and counted; everything else
//! aborts the run with a [`PipelineError`].

pub mod background;
pub mod detector;
pub mod extract;
pub mod preview;
pub mod reference;

use std::path::PathBuf;

use log::{debug, info};
use shared::{ConfigError, StatsError};
use thiserror::Error;

pub use background::{sample_background, sample_backgrounds, BackgroundSamples};
pub use detector::{detect_puncta, process_channel, ChannelDetection, PunctumMeasurement};
pub use extract::{extract_columns, IntensityColumns};
pub use reference::{nucleus_candidates, select_reference_region, ReferenceRegion};

use crate::config::PipelineConfig;
use crate::image_proc::FilterError;
use crate::region_archive::{archive_path, ChannelRegions, RegionArchive};
use crate::results::{ResultWriter, RunHeader};
use crate::selection::{SelectionError, SelectionProvider};
use crate::stack::{Channel, ChannelStack, StackError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("Filter failed: {0}")]
    Filter(#[from] FilterError),
    #[error("Measurement failed: {0}")]
    Stats(#[from] StatsError),
    #[error("Region archive failed: {0}")]
    Archive(#[from] ConfigError),
    #[error("No nucleus region qualifies at threshold {threshold}")]
    NoReferenceRegion { threshold: f64 },
    #[error("Selected nucleus {index} but only {count} candidates exist")]
    InvalidSelection { index: usize, count: usize },
    #[error("{0} background oval covers no pixel of the image")]
    EmptyRegion(Channel),
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Pixel width in µm the punctum areas were calibrated with
    pub pixel_size_um: f64,
    pub backgrounds: BackgroundSamples,
    pub reference: ReferenceRegion,
    /// Per channel, in measurement order
    pub detections: Vec<ChannelDetection>,
    pub archive_path: PathBuf,
    /// Channels whose rows could not be appended to the results file
    pub failed_writes: Vec<Channel>,
}

impl RunReport {
    pub fn detection(&self, channel: Channel) -> Option<&ChannelDetection> {
        self.detections.iter().find(|d| d.channel == channel)
    }
}

/// Run the full pipeline on `stack`
pub fn run_analysis(
    stack: &ChannelStack,
    config: &PipelineConfig,
    provider: &mut dyn SelectionProvider,
) -> Result<RunReport, PipelineError> {
    info!("Analysing {} ({})", stack.title, stack.size());
    let config = &config.calibrated(stack.pixel_size_um);
    debug!(
        "Pixel size {} µm (file calibration {:?})",
        config.pixel_size(),
        stack.pixel_size_um
    );
    let preview_dir = config.preview_dir.as_deref();
    if let Some(dir) = preview_dir {
        preview::write_channel_previews(stack, dir);
    }

    let backgrounds = sample_backgrounds(stack, provider)?;
    let reference = select_reference_region(stack, config, provider, preview_dir)?;

    let writer = ResultWriter::new(&config.results_path);
    let header = RunHeader {
        filename: stack.title.clone(),
        backgrounds,
    };

    let mut detections = Vec::with_capacity(Channel::MEASUREMENT_ORDER.len());
    let mut failed_writes = Vec::new();
    for (position, channel) in Channel::MEASUREMENT_ORDER.into_iter().enumerate() {
        let detection = process_channel(
            stack.channel(channel),
            &reference.roi,
            config,
            stack.max_value,
        )?;
        let columns = extract_columns(&detection.measurements);
        let header = (position == 0).then_some(&header);
        if !writer.append_channel(channel, &columns, header) {
            failed_writes.push(channel);
        }
        detections.push(detection);
    }

    let size = stack.size();
    let archive = RegionArchive {
        source: stack.title.clone(),
        width: size.width,
        height: size.height,
        pixel_size_um: config.pixel_size(),
        reference: reference.roi.row_runs(),
        channels: detections
            .iter()
            .map(|d| ChannelRegions::from_detection(d, config.pixel_area()))
            .collect(),
    };
    let archive_path = archive_path(&stack.parent_dir, &stack.title);
    archive.save(&archive_path)?;

    Ok(RunReport {
        pixel_size_um: config.pixel_size(),
        backgrounds,
        reference,
        detections,
        archive_path,
        failed_writes,
    })
}
