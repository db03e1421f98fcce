//! Measure fluorescent puncta inside one nucleus of a four-channel stack
//!
//! # Usage
//!
//! ```bash
//! # Multi-page TIFF, operator answers prompts on the terminal
//! cargo run --release --bin measure_puncta -- cell01.tif --pixel-size 0.065
//!
//! # Four single-channel files with recorded selections
//! cargo run --release --bin measure_puncta -- dapi.tif gfp.tif rfp.tif cy5.tif \
//!     --selections cell01_selections.json --results results/Results.txt
//! ```
//!
//! Rows are appended to the results file; the detected punctum regions are
//! saved next to the input as `<name without dots>.json`.

use clap::Parser;
use log::{info, warn};
use puncta::config::CONFIG_DOCUMENT;
use puncta::shared_args::SharedAnalysisArgs;
use puncta::{load_stack, run_analysis, Channel, ScriptedSelections, TerminalPrompt};
use shared::ConfigStorage;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "measure_puncta",
    about = "Detect and measure fluorescent puncta inside a selected nucleus",
    long_about = None
)]
struct Args {
    /// One multi-page TIFF, or one image per channel in channel order
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// JSON file with background ovals, threshold and nucleus pick (skips prompts)
    #[arg(long)]
    selections: Option<PathBuf>,

    /// Write contrast-stretched channel previews and the candidate overlay here
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Store the resolved configuration as the default for later runs
    #[arg(long, default_value_t = false)]
    save_config: bool,

    #[command(flatten)]
    shared: SharedAnalysisArgs,
}

fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.shared.debug);

    let mut config = args.shared.resolve_config()?;
    if let Some(dir) = &args.preview_dir {
        config.preview_dir = Some(dir.clone());
    }
    if args.save_config {
        let path = ConfigStorage::new()?.save(CONFIG_DOCUMENT, &config)?;
        info!("Saved configuration to {}", path.display());
    }

    let stack = load_stack(
        &args.inputs,
        &config.channel_order,
        config.contrast_saturation,
    )?;

    let report = match &args.selections {
        Some(path) => {
            let mut scripted = ScriptedSelections::from_file(path)?;
            run_analysis(&stack, &config, &mut scripted)?
        }
        None => {
            let stdin = std::io::stdin();
            let mut prompt = TerminalPrompt::new(stdin.lock(), std::io::stdout());
            run_analysis(&stack, &config, &mut prompt)?
        }
    };

    println!("File: {}", stack.title);
    println!("Pixel size: {} µm", report.pixel_size_um);
    println!(
        "Reference nucleus {} of {} ({} px)",
        report.reference.index,
        report.reference.candidate_count,
        report.reference.roi.pixel_count()
    );
    for channel in Channel::MEASUREMENT_ORDER {
        if let (Some(detection), Some(background)) =
            (report.detection(channel), report.backgrounds.get(channel))
        {
            println!(
                "{:>7}: {:>3} puncta, threshold {:.1}, background {:.2}",
                channel.name(),
                detection.puncta.len(),
                detection.threshold,
                background
            );
        }
    }
    println!("Results appended to {}", config.results_path.display());
    println!("Regions saved to {}", report.archive_path.display());

    if !report.failed_writes.is_empty() {
        warn!(
            "Rows for {:?} could not be written to {}",
            report.failed_writes,
            config.results_path.display()
        );
    }

    Ok(())
}
