//! Ingest command implementation

use super::{process_trace, TraceArgs};
use crate::output;
use anyhow::Result;
use clap::Args;
use tracery_processor::metrics::encode_metrics;

#[derive(Args, Debug)]
pub struct IngestArgs {
    #[command(flatten)]
    pub trace: TraceArgs,

    /// Only report these tables (repeatable)
    #[arg(short, long)]
    pub table: Vec<String>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print Prometheus metrics
    #[arg(long)]
    pub metrics: bool,
}

pub fn run(args: IngestArgs) -> Result<()> {
    let processor = process_trace(&args.trace)?;
    let mut summary = processor.summary();
    summary.retain_tables(&args.table);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::success(&format!(
            "Processed {} packets from {}",
            processor.packets_parsed(),
            args.trace.trace.display()
        ));
        output::tables(&summary);
        output::stats(&summary.stats);
    }

    if args.metrics {
        print!("{}", encode_metrics()?);
    }
    Ok(())
}
