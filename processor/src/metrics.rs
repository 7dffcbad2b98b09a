//! Prometheus metrics for the processor

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, CounterVec, Encoder, Histogram, TextEncoder,
};

// ── Ingestion metrics ────────────────────────────────────────────────────────

pub static PACKETS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("tracery_packets_total", "Trace packets parsed", &["kind"]).unwrap()
});

pub static STATS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tracery_stats_total",
        "Import diagnostic counter increments",
        &["name"]
    )
    .unwrap()
});

// ── Interning metrics ────────────────────────────────────────────────────────

pub static ROWS_INTERNED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tracery_rows_interned_total",
        "New stack profile rows created",
        &["table"]
    )
    .unwrap()
});

pub static DEDUP_HITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tracery_dedup_hits_total",
        "Stack profile rows resolved to an existing row",
        &["table", "tier"]
    )
    .unwrap()
});

// ── End of file ──────────────────────────────────────────────────────────────

pub static END_OF_FILE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tracery_end_of_file_duration_seconds",
        "Time spent in end-of-file resolution",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
