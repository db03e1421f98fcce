use crate::config::{PipelineConfig, PipelineConfigError};
use crate::stack::Channel;
use clap::Parser;
use log::debug;
use shared::ConfigStorage;
use std::path::PathBuf;

/// Parse a channel order string in format "nucleus,green,red,farred"
fn parse_channel_order(s: &str) -> Result<Vec<Channel>, String> {
    let order = s
        .split(',')
        .map(|part| part.parse::<Channel>())
        .collect::<Result<Vec<_>, _>>()?;
    crate::stack::validate_channel_order(&order).map_err(|e| e.to_string())?;
    Ok(order)
}

/// Stack plane to channel mapping given on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOrderArg(pub Vec<Channel>);

impl std::str::FromStr for ChannelOrderArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_channel_order(s).map(ChannelOrderArg)
    }
}

impl std::fmt::Display for ChannelOrderArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.0.iter().map(|c| c.name().to_lowercase()).collect();
        write!(f, "{}", names.join(","))
    }
}

fn parse_positive(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid numeric value: {}", s))?;
    if value <= 0.0 {
        return Err("Value must be positive".to_string());
    }
    Ok(value)
}

/// Common arguments shared across analysis binaries
///
/// Every field is optional; unset fields fall back to the configuration file
/// and then to built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
pub struct SharedAnalysisArgs {
    /// JSON configuration file (defaults to ~/.puncta_config/pipeline.json when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Results file, appended to on every run
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Pixel size in micrometres, overriding the image's own calibration
    #[arg(long, value_parser = parse_positive)]
    pub pixel_size: Option<f64>,

    /// Channel of each stack plane (format: "nucleus,green,red,farred")
    #[arg(long)]
    pub channel_order: Option<ChannelOrderArg>,

    /// Measure puncta on the raw channel instead of the sharpened one
    #[arg(long, default_value_t = false)]
    pub measure_raw: bool,

    /// Enable debug output
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

impl SharedAnalysisArgs {
    /// Layer defaults, the configuration file and these flags
    pub fn resolve_config(&self) -> Result<PipelineConfig, PipelineConfigError> {
        let mut config = match &self.config {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                PipelineConfig::from_file(path)?
            }
            None => match ConfigStorage::new() {
                Ok(storage) => PipelineConfig::from_storage(&storage)?,
                Err(_) => PipelineConfig::default(),
            },
        };

        if let Some(results) = &self.results {
            config.results_path = results.clone();
        }
        if let Some(pixel_size) = self.pixel_size {
            config.pixel_size_um = Some(pixel_size);
        }
        if let Some(ChannelOrderArg(order)) = &self.channel_order {
            config.channel_order = order.clone();
        }
        if self.measure_raw {
            config.measure_sharpened = false;
        }

        config.validate()?;
        Ok(config)
    }
}
