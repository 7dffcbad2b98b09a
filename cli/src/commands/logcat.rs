//! Logcat command implementation

use super::load_config;
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracery_processor::TraceProcessor;

#[derive(Args, Debug)]
pub struct LogcatArgs {
    /// Output of `logcat -v threadtime` or a bugreport
    pub file: PathBuf,

    /// Year of the log lines, which carry none
    #[arg(long)]
    pub year: Option<i32>,

    /// Processor configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the imported events as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: LogcatArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(year) = args.year {
        config.android_log_year = year;
    }
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let mut processor = TraceProcessor::new(config);
    let parsed = processor.parse_logcat(&text);

    if args.json {
        let storage = processor.storage();
        for row in &storage.android_logs {
            let event = serde_json::json!({
                "ts": row.ts,
                "tid": storage.threads[row.utid].tid,
                "prio": row.prio,
                "tag": storage.get_string(row.tag),
                "msg": storage.get_string(row.msg),
            });
            println!("{}", event);
        }
        return Ok(());
    }

    output::success(&format!("Imported {} log events", parsed));
    output::stats(&processor.summary().stats);
    Ok(())
}
