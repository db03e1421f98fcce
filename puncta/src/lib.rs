//! Nuclear punctum detection and intensity measurement
//!
//! Loads a four-channel fluorescence stack, selects one reference nucleus and
//! measures the small fluorescent puncta inside it in each of the Red, Green
//! and FarRed channels. Rows are appended to a plain-text results file.

pub mod config;
pub mod image_proc;
pub mod pipeline;
pub mod region_archive;
pub mod results;
pub mod selection;
pub mod shared_args;
pub mod stack;

pub use config::PipelineConfig;
pub use pipeline::{run_analysis, PipelineError, RunReport};
pub use selection::{ScriptedSelections, SelectionProvider, TerminalPrompt};
pub use stack::{load_stack, Channel, ChannelStack};
