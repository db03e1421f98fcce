//! Operator decisions
//!
//! The pipeline stops at three points for an operator: drawing a background
//! oval per fluorescence channel, refining the nucleus threshold, and picking
//! one nucleus when several qualify. [`SelectionProvider`] abstracts those
//! decisions so they can come from a terminal, a scripted file or a test.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image_proc::Oval;
use crate::stack::{Channel, ChannelImage};

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Selection I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse selection file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("No {0} provided")]
    Missing(String),
    #[error("Operator input ended before a selection was made")]
    Aborted,
}

/// What the operator sees of one nucleus candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateSummary {
    pub index: usize,
    pub area_px: usize,
    pub centroid_x: f64,
    pub centroid_y: f64,
}

/// Source of operator decisions
pub trait SelectionProvider {
    /// Oval covering background (cell-free) signal in `image`
    fn background_oval(&mut self, channel: Channel, image: &ChannelImage)
        -> Result<Oval, SelectionError>;

    /// Final nucleus threshold given the automatic proposal and the channel's value range
    fn refine_nucleus_threshold(
        &mut self,
        proposed: f64,
        range: (f64, f64),
    ) -> Result<f64, SelectionError>;

    /// Index of the reference nucleus among `candidates`
    ///
    /// Only called when more than one candidate qualifies. The returned index
    /// is validated by the caller.
    fn pick_reference(&mut self, candidates: &[CandidateSummary]) -> Result<usize, SelectionError>;
}

/// Decisions recorded in a JSON file for unattended runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedSelections {
    /// Background oval per fluorescence channel
    pub backgrounds: HashMap<Channel, Oval>,
    /// Overrides the automatic nucleus threshold when set
    #[serde(default)]
    pub nucleus_threshold: Option<f64>,
    /// Reference nucleus index, required when several nuclei qualify
    #[serde(default)]
    pub reference_index: Option<usize>,
}

impl ScriptedSelections {
    pub fn from_file(path: &Path) -> Result<Self, SelectionError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| SelectionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl SelectionProvider for ScriptedSelections {
    fn background_oval(
        &mut self,
        channel: Channel,
        _image: &ChannelImage,
    ) -> Result<Oval, SelectionError> {
        self.backgrounds
            .get(&channel)
            .copied()
            .ok_or_else(|| SelectionError::Missing(format!("{channel} background oval")))
    }

    fn refine_nucleus_threshold(
        &mut self,
        proposed: f64,
        _range: (f64, f64),
    ) -> Result<f64, SelectionError> {
        Ok(self.nucleus_threshold.unwrap_or(proposed))
    }

    fn pick_reference(&mut self, _candidates: &[CandidateSummary]) -> Result<usize, SelectionError> {
        self.reference_index
            .ok_or_else(|| SelectionError::Missing("reference nucleus index".to_string()))
    }
}

/// Line-oriented prompt, typically over stdin/stdout
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, prompt: &str) -> Result<String, SelectionError> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(SelectionError::Aborted);
        }
        Ok(line.trim().to_string())
    }

    /// Repeat `prompt` until `parse` accepts the answer
    fn ask_until<T>(
        &mut self,
        prompt: &str,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<T, SelectionError> {
        loop {
            let answer = self.ask(prompt)?;
            match parse(&answer) {
                Ok(value) => return Ok(value),
                Err(msg) => writeln!(self.output, "  {msg}")?,
            }
        }
    }
}

fn parse_oval(text: &str) -> Result<Oval, String> {
    let values: Vec<f64> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| format!("'{s}' is not a number")))
        .collect::<Result<_, _>>()?;
    match values.as_slice() {
        &[x, y, width, height] if width > 0.0 && height > 0.0 => Ok(Oval {
            x,
            y,
            width,
            height,
        }),
        &[_, _, _, _] => Err("width and height must be positive".to_string()),
        _ => Err("expected four values: x y width height".to_string()),
    }
}

impl<R: BufRead, W: Write> SelectionProvider for TerminalPrompt<R, W> {
    fn background_oval(
        &mut self,
        channel: Channel,
        image: &ChannelImage,
    ) -> Result<Oval, SelectionError> {
        let (rows, cols) = image.pixels.dim();
        writeln!(
            self.output,
            "{channel} channel ({cols}x{rows}): outline a background area"
        )?;
        let oval = self.ask_until("Background oval (x y width height): ", parse_oval)?;
        debug!("{channel} background oval {oval:?}");
        Ok(oval)
    }

    fn refine_nucleus_threshold(
        &mut self,
        proposed: f64,
        range: (f64, f64),
    ) -> Result<f64, SelectionError> {
        let prompt = format!(
            "Nucleus threshold [{proposed}] (range {}..{}, enter to accept): ",
            range.0, range.1
        );
        self.ask_until(&prompt, |answer| {
            if answer.is_empty() {
                return Ok(proposed);
            }
            answer
                .parse::<f64>()
                .map_err(|_| format!("'{answer}' is not a number"))
        })
    }

    fn pick_reference(&mut self, candidates: &[CandidateSummary]) -> Result<usize, SelectionError> {
        writeln!(self.output, "{} nucleus candidates:", candidates.len())?;
        for c in candidates {
            writeln!(
                self.output,
                "  [{}] area {} px, centre ({:.1}, {:.1})",
                c.index, c.area_px, c.centroid_x, c.centroid_y
            )?;
        }
        self.ask_until("Reference nucleus index: ", |answer| {
            answer
                .parse::<usize>()
                .map_err(|_| format!("'{answer}' is not an index"))
        })
    }
}
