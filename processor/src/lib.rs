//! Trace processor library
//!
//! Turns decoded trace packets into deduplicated stack-profile tables,
//! heap-profile deltas, Java heap graphs and log rows. Feed packets to a
//! [`TraceProcessor`] in file order, then call
//! [`TraceProcessor::notify_end_of_file`].

pub mod android_log;
pub mod config;
pub mod context;
pub mod deobfuscation;
pub mod error;
pub mod export;
pub mod heap_graph;
pub mod ingest;
pub mod java_types;
pub mod metrics;
pub mod process_tracker;
pub mod profiling;
pub mod reader;
pub mod sequence;
pub mod storage;

pub use config::ProcessorConfig;
pub use context::TraceContext;
pub use error::{ProcessorError, Result};
pub use export::{collapsed_stacks, StackWeight, TraceSummary};
pub use ingest::TraceProcessor;
pub use reader::{read_packets, PacketReader};
pub use storage::{Stat, TraceStorage};
