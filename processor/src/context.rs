//! State shared by every tracker of a processing session

use crate::config::ProcessorConfig;
use crate::process_tracker::ProcessTracker;
use crate::profiling::registry::StackProfileRegistry;
use crate::storage::TraceStorage;

/// Session-wide state handed to trackers by `&mut`.
///
/// Processing is single threaded, so the registry and storage are plain
/// owned values rather than shared, synchronized handles.
#[derive(Debug, Default)]
pub struct TraceContext {
    pub config: ProcessorConfig,
    pub storage: TraceStorage,
    pub registry: StackProfileRegistry,
    pub process_tracker: ProcessTracker,
}

impl TraceContext {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}
