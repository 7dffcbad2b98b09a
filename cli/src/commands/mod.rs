//! Subcommands

pub mod config;
pub mod export;
pub mod ingest;
pub mod logcat;
pub mod stats;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracery_processor::{PacketReader, ProcessorConfig, TraceProcessor};

/// Options shared by every command that processes a trace
#[derive(Args, Debug)]
pub struct TraceArgs {
    /// JSON-lines packet stream
    pub trace: PathBuf,

    /// Processor configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hide the progress spinner
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn load_config(path: Option<&Path>) -> Result<ProcessorConfig> {
    let config = ProcessorConfig::load(path).context("Failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

/// Parse every packet of the trace and run the end-of-file passes.
pub fn process_trace(args: &TraceArgs) -> Result<TraceProcessor> {
    let config = load_config(args.config.as_deref())?;
    let reader = PacketReader::open(&args.trace)
        .with_context(|| format!("Failed to open {}", args.trace.display()))?;

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    };

    let mut processor = TraceProcessor::new(config);
    for packet in reader {
        let packet = packet.with_context(|| format!("Failed to read {}", args.trace.display()))?;
        processor.parse_packet(&packet);
        if processor.packets_parsed() % 10_000 == 0 {
            progress.set_message(format!("{} packets", processor.packets_parsed()));
        }
    }
    progress.set_message("resolving");
    processor.notify_end_of_file();
    progress.finish_and_clear();
    Ok(processor)
}
