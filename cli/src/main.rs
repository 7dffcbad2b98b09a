//! CLI for Tracery
//!
//! Commands:
//! - ingest: Process a packet stream and print table sizes
//! - logcat: Import a logcat text dump
//! - stats: Print import diagnostics
//! - export: Write collapsed stacks for flamegraph tools
//! - config: Print the effective configuration

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "tracery")]
#[command(about = "Tracery - trace processor for stack and heap profiles", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a JSON-lines packet stream
    Ingest(commands::ingest::IngestArgs),

    /// Import a logcat text dump
    Logcat(commands::logcat::LogcatArgs),

    /// Print the diagnostics counted while processing a trace
    Stats(commands::stats::StatsArgs),

    /// Export callstacks in collapsed-stack format
    Export(commands::export::ExportArgs),

    /// Print the effective processor configuration as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(args),
        Commands::Logcat(args) => commands::logcat::run(args),
        Commands::Stats(args) => commands::stats::run(args),
        Commands::Export(args) => commands::export::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
