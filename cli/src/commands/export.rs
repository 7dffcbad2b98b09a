//! Export command implementation

use super::{process_trace, TraceArgs};
use crate::output;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use tracery_processor::{collapsed_stacks, StackWeight};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Weight {
    /// Heap bytes not freed by the end of the trace
    Retained,
    /// Heap bytes allocated
    Allocated,
    /// CPU and perf sample counts
    Samples,
}

impl From<Weight> for StackWeight {
    fn from(weight: Weight) -> Self {
        match weight {
            Weight::Retained => StackWeight::HeapRetained,
            Weight::Allocated => StackWeight::HeapAllocated,
            Weight::Samples => StackWeight::Samples,
        }
    }
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub trace: TraceArgs,

    /// What each stack is weighted by
    #[arg(short, long, value_enum, default_value = "retained")]
    pub weight: Weight,

    /// Output file, stdout when absent
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: ExportArgs) -> Result<()> {
    let processor = process_trace(&args.trace)?;
    let collapsed = collapsed_stacks(processor.storage(), args.weight.into());
    if collapsed.is_empty() {
        output::warning("No stacks with a positive weight");
    }

    match args.output {
        Some(path) => {
            std::fs::write(&path, &collapsed)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output::success(&format!("Wrote {}", path.display()));
        }
        None => print!("{}", collapsed),
    }
    Ok(())
}
