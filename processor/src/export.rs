//! Export of processed data
//!
//! - **Summary**: row counts and non-zero stats, serializable as JSON
//! - **Collapsed stacks**: Brendan Gregg format (`root;...;leaf weight`),
//!   readable by `flamegraph.pl`, speedscope and Pyroscope

use crate::storage::{StatEntry, TraceStorage};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracery_shared::types::ids::{CallsiteId, FrameId, StringId, SymbolSetId};

/// What a collapsed stack is weighted by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackWeight {
    /// Bytes allocated and not freed
    HeapRetained,
    /// Bytes allocated, ignoring frees
    HeapAllocated,
    /// CPU and perf sample counts
    Samples,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    pub tables: BTreeMap<&'static str, usize>,
    pub stats: Vec<StatEntry>,
}

impl TraceSummary {
    pub fn from_storage(storage: &TraceStorage) -> Self {
        Self {
            tables: storage.table_sizes().into_iter().collect(),
            stats: storage.stats.entries(),
        }
    }

    /// Only the named tables, keeping all stats
    pub fn retain_tables(&mut self, names: &[String]) {
        if !names.is_empty() {
            self.tables.retain(|name, _| names.iter().any(|n| n == name));
        }
    }
}

/// Render callsites in collapsed-stack format, heaviest first.
pub fn collapsed_stacks(storage: &TraceStorage, weight: StackWeight) -> String {
    let mut weights: HashMap<CallsiteId, i64> = HashMap::new();
    match weight {
        StackWeight::HeapRetained => {
            for row in &storage.heap_profile_allocations {
                *weights.entry(row.callsite_id).or_default() += row.size;
            }
        }
        StackWeight::HeapAllocated => {
            for row in storage.heap_profile_allocations.iter().filter(|r| r.size > 0) {
                *weights.entry(row.callsite_id).or_default() += row.size;
            }
        }
        StackWeight::Samples => {
            let callsites = storage
                .cpu_profile_samples
                .iter()
                .map(|s| s.callsite_id)
                .chain(storage.perf_samples.iter().filter_map(|s| s.callsite_id));
            for callsite in callsites {
                *weights.entry(callsite).or_default() += 1;
            }
        }
    }

    let labels = FrameLabeler::new(storage);
    let mut lines: Vec<(String, i64)> = weights
        .into_iter()
        .filter(|&(_, w)| w > 0)
        .map(|(callsite, w)| {
            let mut frames: Vec<String> = storage
                .callsite_chain(callsite)
                .map(|(_, row)| labels.label(row.frame_id))
                .collect();
            frames.reverse();
            (frames.join(";"), w)
        })
        .collect();
    lines.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut collapsed = String::new();
    for (stack, w) in lines {
        collapsed.push_str(&stack);
        collapsed.push(' ');
        collapsed.push_str(&w.to_string());
        collapsed.push('\n');
    }
    collapsed
}

/// Best available name for a frame: deobfuscated, then symbolized, then
/// the interned name, then `module+0xpc`.
struct FrameLabeler<'a> {
    storage: &'a TraceStorage,
    symbols: HashMap<SymbolSetId, StringId>,
}

impl<'a> FrameLabeler<'a> {
    fn new(storage: &'a TraceStorage) -> Self {
        let mut symbols = HashMap::new();
        for symbol in &storage.symbols {
            symbols.entry(symbol.symbol_set_id).or_insert(symbol.name);
        }
        Self { storage, symbols }
    }

    fn label(&self, frame: FrameId) -> String {
        let Some(row) = self.storage.frames.get(frame) else {
            return format!("<unknown frame {frame}>");
        };
        let named = row
            .deobfuscated_name
            .or_else(|| row.symbol_set_id.and_then(|s| self.symbols.get(&s).copied()))
            .or((!row.name.is_empty()).then_some(row.name));
        if let Some(name) = named {
            return self.storage.get_string(name).to_string();
        }
        let module = self
            .storage
            .mappings
            .get(row.mapping)
            .map(|m| self.storage.get_string(m.name))
            .unwrap_or_default();
        let module = module.rsplit('/').next().unwrap_or(module);
        format!("{}+0x{:x}", module, row.rel_pc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracery_shared::types::ids::{UniquePid, UniqueTid};
    use tracery_shared::types::profile::{
        CallsiteRow, CpuProfileStackSampleRow, FrameRow, HeapProfileAllocationRow, MappingRow,
        SymbolRow,
    };

    fn storage() -> (TraceStorage, CallsiteId, CallsiteId) {
        let mut storage = TraceStorage::new();
        let name = storage.intern_string("/system/lib64/libc.so");
        let mapping = storage.mappings.insert(MappingRow {
            build_id: StringId::EMPTY,
            exact_offset: 0,
            start_offset: 0,
            start: 0,
            end: 0x1000,
            load_bias: 0,
            name,
        });
        let main = storage.intern_string("main");
        let root = storage.frames.insert(FrameRow::new(main, mapping, 0x10));
        let leaf = storage.frames.insert(FrameRow::new(StringId::EMPTY, mapping, 0xab));

        let root_cs = storage.callsites.insert(CallsiteRow {
            depth: 0,
            parent_id: None,
            frame_id: root,
        });
        let leaf_cs = storage.callsites.insert(CallsiteRow {
            depth: 1,
            parent_id: Some(root_cs),
            frame_id: leaf,
        });
        (storage, root_cs, leaf_cs)
    }

    fn alloc(callsite: CallsiteId, size: i64) -> HeapProfileAllocationRow {
        HeapProfileAllocationRow {
            ts: 0,
            upid: UniquePid(0),
            heap_name: StringId::EMPTY,
            callsite_id: callsite,
            count: size.signum(),
            size,
        }
    }

    #[test]
    fn test_heap_collapsed() {
        let (mut storage, root, leaf) = storage();
        storage.heap_profile_allocations.extend([
            alloc(leaf, 100),
            alloc(leaf, -40),
            alloc(root, 10),
        ]);

        assert_eq!(
            collapsed_stacks(&storage, StackWeight::HeapRetained),
            "main;libc.so+0xab 60\nmain 10\n"
        );
        assert_eq!(
            collapsed_stacks(&storage, StackWeight::HeapAllocated),
            "main;libc.so+0xab 100\nmain 10\n"
        );
    }

    #[test]
    fn test_samples_use_symbols() {
        let (mut storage, _, leaf) = storage();
        let set = storage.new_symbol_set_id();
        let malloc = storage.intern_string("malloc");
        storage.symbols.push(SymbolRow {
            symbol_set_id: set,
            name: malloc,
            source_file: StringId::EMPTY,
            line_number: 0,
        });
        storage.frames[FrameId(1)].symbol_set_id = Some(set);
        for ts in 0..3 {
            storage.cpu_profile_samples.push(CpuProfileStackSampleRow {
                ts,
                callsite_id: leaf,
                utid: UniqueTid(0),
            });
        }

        assert_eq!(collapsed_stacks(&storage, StackWeight::Samples), "main;malloc 3\n");
    }

    #[test]
    fn test_summary_filters_tables() {
        let (storage, _, _) = storage();
        let mut summary = TraceSummary::from_storage(&storage);
        assert_eq!(summary.tables["stack_profile_frame"], 2);
        summary.retain_tables(&["stack_profile_callsite".to_string()]);
        assert_eq!(summary.tables.len(), 1);
        assert_eq!(summary.tables["stack_profile_callsite"], 2);
    }
}
