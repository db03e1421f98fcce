//! Append-only plain-text results file
//!
//! Each run appends a header (source file name and the three background
//! samples) followed by one line per punctum per channel. Lines are meant for
//! spreadsheet import, so the layout and number rendering never change.
//! Write failures are logged and do not stop the run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::pipeline::{BackgroundSamples, IntensityColumns};
use crate::stack::Channel;

/// Per-run header fields
#[derive(Debug, Clone, PartialEq)]
pub struct RunHeader {
    pub filename: String,
    pub backgrounds: BackgroundSamples,
}

/// Render a double the way the results format expects
///
/// Plain decimal with at least one fractional digit for magnitudes in
/// [1e-3, 1e7), otherwise scientific with an upper-case `E`
/// (`3.0`, `10.5`, `1.2345E7`, `1.0E-4`). Uses the shortest digits that
/// round-trip.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = value.abs();
    if value == 0.0 || (1e-3..1e7).contains(&magnitude) {
        let plain = format!("{value}");
        return if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        };
    }

    let sci = format!("{value:e}");
    match sci.split_once('e') {
        Some((mantissa, exponent)) if mantissa.contains('.') => format!("{mantissa}E{exponent}"),
        Some((mantissa, exponent)) => format!("{mantissa}.0E{exponent}"),
        None => sci,
    }
}

/// Run header: two blank lines, file name, backgrounds, two blank lines
pub fn format_header(header: &RunHeader) -> String {
    format!(
        "\n\n File= {}\n Green Background = {}\n Red Background = {}\n FarRed Background = {}\n\n",
        header.filename,
        format_value(header.backgrounds.green),
        format_value(header.backgrounds.red),
        format_value(header.backgrounds.far_red),
    )
}

/// One line per punctum of `channel`
pub fn format_channel_block(channel: Channel, columns: &IntensityColumns) -> String {
    let mut block = String::new();
    for z in 0..columns.len() {
        block.push_str(&format!(
            "{channel} Dot = {z} Mean Intensity = {} Mode Intensity = {} Min Intensity = {} \
             Max Intensity = {} Integrated Density = {} Median Intensity = {} \
             Raw Integrated Density = {}\n",
            format_value(columns.mean[z]),
            format_value(columns.mode[z]),
            format_value(columns.min[z]),
            format_value(columns.max[z]),
            format_value(columns.integrated_density[z]),
            format_value(columns.median[z]),
            format_value(columns.raw_integrated_density[z]),
        ));
    }
    block
}

/// Appends channel blocks to the results file
#[derive(Debug, Clone)]
pub struct ResultWriter {
    path: PathBuf,
}

impl ResultWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, text: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(text.as_bytes())?;
        file.flush()
    }

    /// Append one channel's rows, preceded by `header` when given
    ///
    /// Returns false when the write failed; the failure is logged.
    pub fn append_channel(
        &self,
        channel: Channel,
        columns: &IntensityColumns,
        header: Option<&RunHeader>,
    ) -> bool {
        let mut text = header.map(format_header).unwrap_or_default();
        text.push_str(&format_channel_block(channel, columns));

        match self.append(&text) {
            Ok(()) => {
                debug!(
                    "Appended {} {channel} rows to {}",
                    columns.len(),
                    self.path.display()
                );
                true
            }
            Err(e) => {
                error!("Error writing to file '{}': {e}", self.path.display());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn two_red_puncta() -> IntensityColumns {
        IntensityColumns {
            mean: vec![120.5, 98.25],
            mode: vec![118.0, 97.0],
            min: vec![60.0, 41.0],
            max: vec![250.0, 180.0],
            integrated_density: vec![482.0, 1.2345e7],
            median: vec![119.0, 98.0],
            raw_integrated_density: vec![482.0, 393.0],
        }
    }

    fn header() -> RunHeader {
        RunHeader {
            filename: "test.dv".to_string(),
            backgrounds: BackgroundSamples {
                green: 10.5,
                red: 12.2,
                far_red: 8.9,
            },
        }
    }

    const EXPECTED: &str = "\n\n File= test.dv\n Green Background = 10.5\n Red Background = 12.2\n FarRed Background = 8.9\n\n\
Red Dot = 0 Mean Intensity = 120.5 Mode Intensity = 118.0 Min Intensity = 60.0 Max Intensity = 250.0 Integrated Density = 482.0 Median Intensity = 119.0 Raw Integrated Density = 482.0\n\
Red Dot = 1 Mean Intensity = 98.25 Mode Intensity = 97.0 Min Intensity = 41.0 Max Intensity = 180.0 Integrated Density = 1.2345E7 Median Intensity = 98.0 Raw Integrated Density = 393.0\n";

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(10.5), "10.5");
        assert_eq!(format_value(3.0), "3.0");
        assert_eq!(format_value(0.0), "0.0");
        assert_eq!(format_value(-2.25), "-2.25");
        assert_eq!(format_value(0.001), "0.001");
        assert_eq!(format_value(9999999.0), "9999999.0");
        assert_eq!(format_value(1.2345e7), "1.2345E7");
        assert_eq!(format_value(1.0e7), "1.0E7");
        assert_eq!(format_value(1.5e-4), "1.5E-4");
        assert_eq!(format_value(f64::NAN), "NaN");
    }

    #[test]
    fn test_red_run_matches_literal_format() {
        let text = format_header(&header()) + &format_channel_block(Channel::Red, &two_red_puncta());
        assert_eq!(text, EXPECTED);
    }

    #[test]
    fn test_second_run_appends() {
        let temp = TempDir::new().unwrap();
        let writer = ResultWriter::new(temp.path().join("Results.txt"));

        assert!(writer.append_channel(Channel::Red, &two_red_puncta(), Some(&header())));
        let first = std::fs::read_to_string(writer.path()).unwrap();
        assert_eq!(first, EXPECTED);

        assert!(writer.append_channel(Channel::Green, &IntensityColumns::default(), Some(&header())));
        assert!(writer.append_channel(Channel::Red, &two_red_puncta(), None));
        let second = std::fs::read_to_string(writer.path()).unwrap();

        assert!(second.starts_with(&first));
        assert_eq!(second.matches(" File= test.dv").count(), 2);
        assert_eq!(second.matches("Red Dot = 1 ").count(), 2);
    }

    #[test]
    fn test_write_failure_is_reported_not_fatal() {
        let temp = TempDir::new().unwrap();
        let writer = ResultWriter::new(temp.path().join("missing").join("Results.txt"));
        assert!(!writer.append_channel(Channel::Red, &two_red_puncta(), Some(&header())));
    }
}
