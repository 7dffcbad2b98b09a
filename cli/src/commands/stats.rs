//! Stats command implementation

use super::{process_trace, TraceArgs};
use crate::output;
use anyhow::Result;
use clap::Args;
use tracery_processor::storage::Severity;

#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub trace: TraceArgs,

    /// Exit with an error if any error-severity counter is set
    #[arg(long)]
    pub strict: bool,
}

pub fn run(args: StatsArgs) -> Result<()> {
    let processor = process_trace(&args.trace)?;
    let entries = processor.summary().stats;
    output::stats(&entries);

    let errors = entries
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .count();
    if args.strict && errors > 0 {
        anyhow::bail!("{} error counters set", errors);
    }
    Ok(())
}
