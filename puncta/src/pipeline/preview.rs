//! Display previews for the operator
//!
//! Previews are a convenience; failing to write one is logged and ignored.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::image_proc::display::{outline_color_name, render_outlines, render_preview};
use crate::image_proc::Roi;
use crate::stack::{Channel, ChannelStack};

fn preview_path(dir: &Path, title: &str, suffix: &str) -> PathBuf {
    let stem = Path::new(title)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| title.to_string());
    dir.join(format!("{stem}_{suffix}.png"))
}

fn ensure_dir(dir: &Path) -> bool {
    match std::fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            warn!("Cannot create preview directory {}: {e}", dir.display());
            false
        }
    }
}

/// Write one contrast-stretched PNG per channel; returns the files written
pub fn write_channel_previews(stack: &ChannelStack, dir: &Path) -> Vec<PathBuf> {
    if !ensure_dir(dir) {
        return Vec::new();
    }
    let mut written = Vec::new();
    for channel in Channel::ALL {
        let image = stack.channel(channel);
        let path = preview_path(dir, &stack.title, &channel.name().to_lowercase());
        match render_preview(image.pixels.view(), &image.display).save(&path) {
            Ok(()) => written.push(path),
            Err(e) => warn!("Failed to write preview {}: {e}", path.display()),
        }
    }
    info!("Wrote {} channel previews to {}", written.len(), dir.display());
    written
}

/// Write the nucleus channel with each candidate outlined in a cycling colour
pub fn write_candidate_overlay(stack: &ChannelStack, candidates: &[Roi], dir: &Path) -> Option<PathBuf> {
    if !ensure_dir(dir) {
        return None;
    }
    let nucleus = stack.channel(Channel::Nucleus);
    let overlay = render_outlines(nucleus.pixels.view(), &nucleus.display, candidates);
    let path = preview_path(dir, &stack.title, "candidates");
    if let Err(e) = overlay.save(&path) {
        warn!("Failed to write candidate overlay {}: {e}", path.display());
        return None;
    }
    for (index, roi) in candidates.iter().enumerate() {
        let (x, y) = roi.centroid();
        info!(
            "Candidate {index}: {} outline, centre ({x:.0}, {y:.0})",
            outline_color_name(index)
        );
    }
    info!("Candidate overlay written to {}", path.display());
    Some(path)
}
