//! Per-sequence incremental state
//!
//! A producer writes packets on its own sequence and interns records once,
//! then refers to them by id. Interned tables and packet defaults together
//! form a generation; a new generation starts when the producer clears its
//! incremental state or changes its defaults. Generations share their tables
//! until one of them is written to.

use crate::profiling::sequence_tracker::{InternLookup, InternedStringKind, SequenceStackProfileTracker};
use std::collections::HashMap;
use std::rc::Rc;
use tracery_shared::types::events::{
    InternedData, InternedString, ProfilePacket, RawString, SourceFrame, SourceMapping,
    TracePacketDefaults,
};
use tracery_shared::types::ids::{
    InternId, SequenceId, SourceCallstackId, SourceFrameId, SourceMappingId, SourceStringId,
};

#[derive(Debug, Clone, Default)]
struct InternedTables {
    build_ids: HashMap<InternId, RawString>,
    mapping_paths: HashMap<InternId, RawString>,
    function_names: HashMap<InternId, RawString>,
    mappings: HashMap<InternId, SourceMapping>,
    frames: HashMap<InternId, SourceFrame>,
    callstacks: HashMap<InternId, Vec<SourceFrameId>>,
}

impl InternedTables {
    fn merge(&mut self, data: &InternedData) {
        fn strings(table: &mut HashMap<InternId, RawString>, entries: &[InternedString]) {
            for entry in entries {
                table.insert(entry.iid, entry.value.clone());
            }
        }
        strings(&mut self.build_ids, &data.build_ids);
        strings(&mut self.mapping_paths, &data.mapping_paths);
        strings(&mut self.function_names, &data.function_names);
        for m in &data.mappings {
            self.mappings.insert(m.iid, m.mapping.clone());
        }
        for f in &data.frames {
            self.frames.insert(f.iid, f.frame.clone());
        }
        for c in &data.callstacks {
            self.callstacks.insert(c.iid, c.frame_ids.clone());
        }
    }
}

/// Interned tables and defaults valid for a run of packets
#[derive(Debug, Clone, Default)]
pub struct SequenceGeneration {
    index: u32,
    defaults: Option<TracePacketDefaults>,
    tables: Rc<InternedTables>,
}

impl SequenceGeneration {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn defaults(&self) -> Option<&TracePacketDefaults> {
        self.defaults.as_ref()
    }
}

impl InternLookup for SequenceGeneration {
    fn get_string(&self, iid: SourceStringId, kind: InternedStringKind) -> Option<&[u8]> {
        let table = match kind {
            InternedStringKind::BuildId => &self.tables.build_ids,
            InternedStringKind::MappingPath => &self.tables.mapping_paths,
            InternedStringKind::FunctionName => &self.tables.function_names,
        };
        table.get(&iid).map(RawString::as_bytes)
    }

    fn get_mapping(&self, iid: SourceMappingId) -> Option<&SourceMapping> {
        self.tables.mappings.get(&iid)
    }

    fn get_frame(&self, iid: SourceFrameId) -> Option<&SourceFrame> {
        self.tables.frames.get(&iid)
    }

    fn get_callstack(&self, iid: SourceCallstackId) -> Option<&[SourceFrameId]> {
        self.tables.callstacks.get(&iid).map(Vec::as_slice)
    }
}

/// Lookup over the tables a heap profile packet carries inline
///
/// All strings of such a packet share one id space.
#[derive(Debug, Default)]
pub struct EmbeddedInternLookup<'a> {
    strings: HashMap<SourceStringId, &'a RawString>,
    mappings: HashMap<SourceMappingId, &'a SourceMapping>,
    frames: HashMap<SourceFrameId, &'a SourceFrame>,
    callstacks: HashMap<SourceCallstackId, &'a [SourceFrameId]>,
}

impl<'a> EmbeddedInternLookup<'a> {
    pub fn new(packet: &'a ProfilePacket) -> Self {
        Self {
            strings: packet.strings.iter().map(|s| (s.iid, &s.value)).collect(),
            mappings: packet.mappings.iter().map(|m| (m.iid, &m.mapping)).collect(),
            frames: packet.frames.iter().map(|f| (f.iid, &f.frame)).collect(),
            callstacks: packet
                .callstacks
                .iter()
                .map(|c| (c.iid, c.frame_ids.as_slice()))
                .collect(),
        }
    }
}

impl InternLookup for EmbeddedInternLookup<'_> {
    fn get_string(&self, iid: SourceStringId, _kind: InternedStringKind) -> Option<&[u8]> {
        self.strings.get(&iid).map(|s| s.as_bytes())
    }

    fn get_mapping(&self, iid: SourceMappingId) -> Option<&SourceMapping> {
        self.mappings.get(&iid).copied()
    }

    fn get_frame(&self, iid: SourceFrameId) -> Option<&SourceFrame> {
        self.frames.get(&iid).copied()
    }

    fn get_callstack(&self, iid: SourceCallstackId) -> Option<&[SourceFrameId]> {
        self.callstacks.get(&iid).copied()
    }
}

/// Everything the processor remembers about one packet sequence
#[derive(Debug)]
pub struct PacketSequenceState {
    sequence_id: SequenceId,
    current: Rc<SequenceGeneration>,
    pub stack_profile: SequenceStackProfileTracker,
}

impl PacketSequenceState {
    pub fn new(sequence_id: SequenceId) -> Self {
        Self {
            sequence_id,
            current: Rc::new(SequenceGeneration::default()),
            stack_profile: SequenceStackProfileTracker::new(),
        }
    }

    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    /// Handle to the generation in effect; stays valid after later packets
    /// start new generations.
    pub fn current_generation(&self) -> Rc<SequenceGeneration> {
        Rc::clone(&self.current)
    }

    /// Drop all interned data and defaults.
    pub fn on_incremental_state_cleared(&mut self) {
        self.current = Rc::new(SequenceGeneration {
            index: self.current.index + 1,
            defaults: None,
            tables: Rc::new(InternedTables::default()),
        });
        self.stack_profile.clear_indices();
    }

    /// Start a generation with new defaults that keeps the interned tables.
    pub fn update_defaults(&mut self, defaults: TracePacketDefaults) {
        self.current = Rc::new(SequenceGeneration {
            index: self.current.index + 1,
            defaults: Some(defaults),
            tables: Rc::clone(&self.current.tables),
        });
    }

    /// Add interned records to the current generation.
    ///
    /// Copies the tables first if an older generation still shares them.
    pub fn add_interned_data(&mut self, data: &InternedData) {
        let generation = Rc::make_mut(&mut self.current);
        Rc::make_mut(&mut generation.tables).merge(data);
    }
}
