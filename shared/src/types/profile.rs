//! Table row types
//!
//! These rows are what the processor stores after interning; every id field
//! refers to another table of the same session.

use super::events::{AndroidLogPriority, Pid, Tid, Timestamp, Uid};
use super::ids::{
    CallsiteId, FrameId, HeapGraphClassId, HeapGraphObjectId, MappingId, StringId, SymbolSetId,
    UniquePid, UniqueTid,
};
use serde::{Deserialize, Serialize};

/// A memory-mapped binary or library
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingRow {
    /// Hex build id, or the empty string
    pub build_id: StringId,

    pub exact_offset: u64,
    pub start_offset: u64,
    pub start: u64,
    pub end: u64,
    pub load_bias: u64,

    /// Full path of the mapped file
    pub name: StringId,
}

/// A code location inside a mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRow {
    /// Function name, empty when unsymbolized
    pub name: StringId,

    pub mapping: MappingId,

    /// Program counter relative to the mapping
    pub rel_pc: u64,

    /// Original name once a deobfuscation mapping has been applied
    pub deobfuscated_name: Option<StringId>,

    /// Symbols attached by offline symbolization
    pub symbol_set_id: Option<SymbolSetId>,
}

impl FrameRow {
    pub fn new(name: StringId, mapping: MappingId, rel_pc: u64) -> Self {
        Self {
            name,
            mapping,
            rel_pc,
            deobfuscated_name: None,
            symbol_set_id: None,
        }
    }

    /// True if both rows describe the same code location.
    ///
    /// Fields filled in after insertion are not part of the identity.
    pub fn same_location(&self, other: &FrameRow) -> bool {
        self.name == other.name && self.mapping == other.mapping && self.rel_pc == other.rel_pc
    }
}

/// One node of a call stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallsiteRow {
    /// Distance from the outermost frame
    pub depth: u32,

    pub parent_id: Option<CallsiteId>,
    pub frame_id: FrameId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRow {
    pub symbol_set_id: SymbolSetId,
    pub name: StringId,
    pub source_file: StringId,
    pub line_number: u32,
}

/// Allocation or free delta for one callsite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapProfileAllocationRow {
    pub ts: Timestamp,
    pub upid: UniquePid,
    pub heap_name: StringId,
    pub callsite_id: CallsiteId,

    /// Positive for allocations, negative for frees
    pub count: i64,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuProfileStackSampleRow {
    pub ts: Timestamp,
    pub callsite_id: CallsiteId,
    pub utid: UniqueTid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfSampleRow {
    pub ts: Timestamp,
    pub utid: UniqueTid,
    pub cpu: u32,
    pub callsite_id: Option<CallsiteId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRow {
    pub pid: Pid,
    pub name: Option<StringId>,
    pub uid: Option<Uid>,

    /// App id when `uid` belongs to an app
    pub android_appid: Option<Uid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRow {
    pub tid: Tid,
    pub upid: Option<UniquePid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRow {
    pub package_name: StringId,
    pub uid: Uid,
    pub debuggable: bool,
    pub profileable_from_shell: bool,
    pub version_code: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidLogRow {
    pub ts: Timestamp,
    pub utid: UniqueTid,
    pub prio: AndroidLogPriority,
    pub tag: StringId,
    pub msg: StringId,
}

/// A mapping observed in a process address space at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmapRow {
    pub ts: Timestamp,
    pub upid: UniquePid,
    pub start: u64,
    pub end: u64,
    pub mapping: MappingId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapGraphClassRow {
    pub name: StringId,
    pub deobfuscated_name: Option<StringId>,
    pub location: Option<StringId>,
    pub object_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapGraphObjectRow {
    pub upid: UniquePid,
    pub graph_sample_ts: Timestamp,
    pub self_size: u64,
    pub type_id: HeapGraphClassId,

    /// Root kind when the object is a GC root
    pub root_type: Option<StringId>,

    /// Shortest distance from any root, set once roots are marked
    pub root_distance: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapGraphReferenceRow {
    pub owner_id: HeapGraphObjectId,
    pub owned_id: Option<HeapGraphObjectId>,
    pub field_name: StringId,
    pub field_type_name: StringId,
    pub deobfuscated_field_name: Option<StringId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_identity_ignores_late_fields() {
        let a = FrameRow::new(StringId(1), MappingId(0), 0x10);
        let mut b = a.clone();
        b.deobfuscated_name = Some(StringId(7));
        b.symbol_set_id = Some(SymbolSetId(0));
        assert!(a.same_location(&b));
        assert_ne!(a, b);

        let c = FrameRow::new(StringId(1), MappingId(0), 0x11);
        assert!(!a.same_location(&c));
    }

    #[test]
    fn test_allocation_row_serialization() {
        let row = HeapProfileAllocationRow {
            ts: 10,
            upid: UniquePid(1),
            heap_name: StringId(2),
            callsite_id: CallsiteId(3),
            count: -4,
            size: -400,
        };
        let json = serde_json::to_string(&row).unwrap();
        let back: HeapProfileAllocationRow = serde_json::from_str(&json).unwrap();
        assert_eq!(row, back);
    }
}
