//! Output formatting utilities for CLI commands

use colored::Colorize;
use tracery_processor::storage::{Severity, StatEntry};
use tracery_processor::TraceSummary;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print row counts, skipping empty tables
pub fn tables(summary: &TraceSummary) {
    println!("{}", "Tables".bold());
    for (name, rows) in summary.tables.iter().filter(|(_, rows)| **rows > 0) {
        println!("  {:<28} {:>10}", name, rows);
    }
}

/// Print diagnostics, colored by severity
pub fn stats(entries: &[StatEntry]) {
    if entries.is_empty() {
        success("No import diagnostics");
        return;
    }
    println!("{}", "Diagnostics".bold());
    for entry in entries {
        let name = match entry.index {
            Some(index) => format!("{}[{}]", entry.name, index),
            None => entry.name.to_string(),
        };
        let value = entry.value.to_string();
        let value = match entry.severity {
            Severity::Info => value.normal(),
            Severity::DataLoss => value.yellow(),
            Severity::Error => value.red(),
        };
        println!("  {:<44} {:>10}", name, value);
    }
}
