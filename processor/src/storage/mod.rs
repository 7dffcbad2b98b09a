//! In-memory trace storage
//!
//! All tables of one processing session. Rows are append-only; the only
//! post-insert mutations are the late-bound frame and heap-graph fields set
//! by symbolization and deobfuscation.

pub mod stats;
pub mod string_pool;
pub mod table;

pub use stats::{Severity, Stat, StatEntry, Stats};
pub use string_pool::StringPool;
pub use table::Table;

use tracery_shared::types::ids::{
    CallsiteId, FrameId, HeapGraphClassId, HeapGraphObjectId, HeapGraphReferenceId, MappingId,
    StringId, SymbolSetId, UniquePid, UniqueTid,
};
use tracery_shared::types::profile::{
    AndroidLogRow, CallsiteRow, CpuProfileStackSampleRow, FrameRow, HeapGraphClassRow,
    HeapGraphObjectRow, HeapGraphReferenceRow, HeapProfileAllocationRow, MappingRow, MmapRow,
    PackageRow, PerfSampleRow, ProcessRow, SymbolRow, ThreadRow,
};
use tracery_shared::utils::{bytes_to_hex, is_hex_module_id};

#[derive(Debug, Default)]
pub struct TraceStorage {
    pub strings: StringPool,
    pub stats: Stats,

    pub mappings: Table<MappingId, MappingRow>,
    pub frames: Table<FrameId, FrameRow>,
    pub callsites: Table<CallsiteId, CallsiteRow>,
    pub symbols: Vec<SymbolRow>,
    next_symbol_set_id: u32,

    pub heap_profile_allocations: Vec<HeapProfileAllocationRow>,
    pub cpu_profile_samples: Vec<CpuProfileStackSampleRow>,
    pub perf_samples: Vec<PerfSampleRow>,

    pub processes: Table<UniquePid, ProcessRow>,
    pub threads: Table<UniqueTid, ThreadRow>,
    pub packages: Vec<PackageRow>,
    pub mmaps: Vec<MmapRow>,
    pub android_logs: Vec<AndroidLogRow>,

    pub heap_graph_classes: Table<HeapGraphClassId, HeapGraphClassRow>,
    pub heap_graph_objects: Table<HeapGraphObjectId, HeapGraphObjectRow>,
    pub heap_graph_references: Table<HeapGraphReferenceId, HeapGraphReferenceRow>,
}

impl TraceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_string(&mut self, s: &str) -> StringId {
        self.strings.intern(s)
    }

    pub fn get_string(&self, id: StringId) -> &str {
        self.strings.get(id)
    }

    pub fn increment_stat(&mut self, stat: Stat) {
        self.stats.increment(stat);
    }

    pub fn increment_indexed_stat(&mut self, stat: Stat, index: i64) {
        self.stats.increment_indexed(stat, index);
    }

    /// Intern a raw build id as lowercase hex. Ids that already are long hex
    /// strings (breakpad module ids) are kept as they are.
    pub fn intern_build_id(&mut self, raw: &[u8]) -> StringId {
        if raw.is_empty() {
            StringId::EMPTY
        } else if is_hex_module_id(raw) {
            self.strings.intern_bytes(raw)
        } else {
            self.strings.intern(&bytes_to_hex(raw))
        }
    }

    pub fn new_symbol_set_id(&mut self) -> SymbolSetId {
        let id = SymbolSetId(self.next_symbol_set_id);
        self.next_symbol_set_id += 1;
        id
    }

    /// Walk a callsite and its ancestors, leaf first
    pub fn callsite_chain(&self, leaf: CallsiteId) -> CallsiteChain<'_> {
        CallsiteChain {
            callsites: &self.callsites,
            next: Some(leaf),
        }
    }

    /// Row counts per table, for summaries
    pub fn table_sizes(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("stack_profile_mapping", self.mappings.len()),
            ("stack_profile_frame", self.frames.len()),
            ("stack_profile_callsite", self.callsites.len()),
            ("stack_profile_symbol", self.symbols.len()),
            ("heap_profile_allocation", self.heap_profile_allocations.len()),
            ("cpu_profile_stack_sample", self.cpu_profile_samples.len()),
            ("perf_sample", self.perf_samples.len()),
            ("process", self.processes.len()),
            ("thread", self.threads.len()),
            ("package_list", self.packages.len()),
            ("mmap", self.mmaps.len()),
            ("android_logs", self.android_logs.len()),
            ("heap_graph_class", self.heap_graph_classes.len()),
            ("heap_graph_object", self.heap_graph_objects.len()),
            ("heap_graph_reference", self.heap_graph_references.len()),
        ]
    }
}

/// Iterator over a callsite's ancestry
pub struct CallsiteChain<'a> {
    callsites: &'a Table<CallsiteId, CallsiteRow>,
    next: Option<CallsiteId>,
}

impl<'a> Iterator for CallsiteChain<'a> {
    type Item = (CallsiteId, &'a CallsiteRow);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let row = self.callsites.get(id)?;
        self.next = row.parent_id;
        Some((id, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callsite_chain_walks_to_root() {
        let mut storage = TraceStorage::new();
        let root = storage.callsites.insert(CallsiteRow {
            depth: 0,
            parent_id: None,
            frame_id: FrameId(0),
        });
        let leaf = storage.callsites.insert(CallsiteRow {
            depth: 1,
            parent_id: Some(root),
            frame_id: FrameId(1),
        });
        let frames: Vec<_> = storage.callsite_chain(leaf).map(|(_, r)| r.frame_id).collect();
        assert_eq!(frames, vec![FrameId(1), FrameId(0)]);
    }

    #[test]
    fn test_symbol_set_ids_increase() {
        let mut storage = TraceStorage::new();
        assert_eq!(storage.new_symbol_set_id(), SymbolSetId(0));
        assert_eq!(storage.new_symbol_set_id(), SymbolSetId(1));
    }
}
