//! Per-sequence stack profile resolution
//!
//! Maps the sequence-local ids of mappings, frames and callstacks to global
//! rows. Lookups go through three tiers: the sequence's own id maps, its
//! content-keyed caches, and finally the session-wide registry.

use crate::context::TraceContext;
use crate::metrics::DEDUP_HITS_TOTAL;
use crate::storage::Stat;
use std::collections::HashMap;
use tracery_shared::types::events::{SourceFrame, SourceMapping};
use tracery_shared::types::ids::{
    CallsiteId, FrameId, MappingId, SourceCallstackId, SourceFrameId, SourceMappingId,
    SourceStringId, StringId,
};
use tracery_shared::types::profile::{CallsiteRow, FrameRow, MappingRow};
use tracing::debug;

/// Which intern table a string id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternedStringKind {
    BuildId,
    MappingPath,
    FunctionName,
}

/// Access to interned records the tracker has not materialized yet
pub trait InternLookup {
    fn get_string(&self, iid: SourceStringId, kind: InternedStringKind) -> Option<&[u8]>;
    fn get_mapping(&self, iid: SourceMappingId) -> Option<&SourceMapping>;
    fn get_frame(&self, iid: SourceFrameId) -> Option<&SourceFrame>;
    fn get_callstack(&self, iid: SourceCallstackId) -> Option<&[SourceFrameId]>;
}

#[derive(Debug, Default)]
pub struct SequenceStackProfileTracker {
    strings: HashMap<SourceStringId, Vec<u8>>,
    mapping_ids: HashMap<SourceMappingId, MappingId>,
    frame_ids: HashMap<SourceFrameId, FrameId>,
    callstack_ids: HashMap<SourceCallstackId, CallsiteId>,

    mapping_idx: HashMap<MappingRow, MappingId>,
    frame_idx: HashMap<FrameRow, FrameId>,
    callsite_idx: HashMap<CallsiteRow, CallsiteId>,
}

impl SequenceStackProfileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_string(&mut self, iid: SourceStringId, value: &[u8]) {
        self.strings.insert(iid, value.to_vec());
    }

    pub fn add_mapping(
        &mut self,
        ctx: &mut TraceContext,
        iid: SourceMappingId,
        mapping: &SourceMapping,
        lookup: Option<&dyn InternLookup>,
    ) -> Option<MappingId> {
        let mut path = String::new();
        for &name_id in &mapping.name_ids {
            let Some(component) = self.find_string(name_id, InternedStringKind::MappingPath, lookup) else {
                ctx.storage.increment_stat(Stat::StackProfileInvalidStringId);
                debug!("Invalid path string {} in mapping {}", name_id, iid);
                return None;
            };
            path.push('/');
            path.push_str(&String::from_utf8_lossy(&component));
        }
        // Producers that write a single absolute path end up with "//".
        if path.starts_with("//") {
            path.remove(0);
        }

        let Some(raw_build_id) = self.find_string(mapping.build_id, InternedStringKind::BuildId, lookup) else {
            ctx.storage.increment_stat(Stat::StackProfileInvalidStringId);
            debug!("Invalid build id string {} in mapping {}", mapping.build_id, iid);
            return None;
        };
        let build_id = ctx.storage.intern_build_id(&raw_build_id);

        let row = MappingRow {
            build_id,
            exact_offset: mapping.exact_offset,
            start_offset: mapping.start_offset,
            start: mapping.start,
            end: mapping.end,
            load_bias: mapping.load_bias,
            name: ctx.storage.intern_string(&path),
        };
        let id = match self.mapping_idx.get(&row) {
            Some(&id) => {
                DEDUP_HITS_TOTAL.with_label_values(&["mapping", "sequence"]).inc();
                id
            }
            None => {
                let id = ctx.registry.intern_mapping(&mut ctx.storage, row.clone());
                self.mapping_idx.insert(row, id);
                id
            }
        };
        self.mapping_ids.insert(iid, id);
        Some(id)
    }

    pub fn add_frame(
        &mut self,
        ctx: &mut TraceContext,
        iid: SourceFrameId,
        frame: &SourceFrame,
        lookup: Option<&dyn InternLookup>,
    ) -> Option<FrameId> {
        let name = self.find_and_intern_string(ctx, frame.function_name_id, InternedStringKind::FunctionName, lookup)?;
        let mapping = self.find_or_insert_mapping(ctx, frame.mapping_id, lookup)?;

        let row = FrameRow::new(name, mapping, frame.rel_pc);
        let id = match self.frame_idx.get(&row) {
            Some(&id) => {
                DEDUP_HITS_TOTAL.with_label_values(&["frame", "sequence"]).inc();
                id
            }
            None => {
                let id = ctx.registry.intern_frame(&mut ctx.storage, mapping, frame.rel_pc, name);
                self.frame_idx.insert(row, id);
                id
            }
        };
        self.frame_ids.insert(iid, id);
        Some(id)
    }

    /// Resolve `frame_ids` (outermost caller first) into a callsite chain and
    /// return the leaf callsite.
    pub fn add_callstack(
        &mut self,
        ctx: &mut TraceContext,
        iid: SourceCallstackId,
        frame_ids: &[SourceFrameId],
        lookup: Option<&dyn InternLookup>,
    ) -> Option<CallsiteId> {
        if frame_ids.is_empty() {
            ctx.storage.increment_stat(Stat::StackProfileEmptyCallstack);
            debug!("Empty callstack {}", iid);
            return None;
        }

        let mut parent = None;
        for (depth, &frame_iid) in frame_ids.iter().enumerate() {
            let frame_id = self.find_or_insert_frame(ctx, frame_iid, lookup)?;
            let row = CallsiteRow {
                depth: depth as u32,
                parent_id: parent,
                frame_id,
            };
            let callsite = match self.callsite_idx.get(&row) {
                Some(&id) => {
                    DEDUP_HITS_TOTAL.with_label_values(&["callsite", "sequence"]).inc();
                    id
                }
                None => {
                    let id = ctx
                        .registry
                        .intern_callsite(&mut ctx.storage, parent, frame_id, depth as u32);
                    self.callsite_idx.insert(row, id);
                    id
                }
            };
            parent = Some(callsite);
        }

        let leaf = parent?;
        self.callstack_ids.insert(iid, leaf);
        Some(leaf)
    }

    pub fn find_or_insert_mapping(
        &mut self,
        ctx: &mut TraceContext,
        iid: SourceMappingId,
        lookup: Option<&dyn InternLookup>,
    ) -> Option<MappingId> {
        if let Some(&id) = self.mapping_ids.get(&iid) {
            return Some(id);
        }
        match lookup.and_then(|l| l.get_mapping(iid)) {
            Some(mapping) => self.add_mapping(ctx, iid, mapping, lookup),
            None => {
                ctx.storage.increment_stat(Stat::StackProfileInvalidMappingId);
                debug!("Unknown mapping id {}", iid);
                None
            }
        }
    }

    pub fn find_or_insert_frame(
        &mut self,
        ctx: &mut TraceContext,
        iid: SourceFrameId,
        lookup: Option<&dyn InternLookup>,
    ) -> Option<FrameId> {
        if let Some(&id) = self.frame_ids.get(&iid) {
            return Some(id);
        }
        match lookup.and_then(|l| l.get_frame(iid)) {
            Some(frame) => self.add_frame(ctx, iid, frame, lookup),
            None => {
                ctx.storage.increment_stat(Stat::StackProfileInvalidFrameId);
                debug!("Unknown frame id {}", iid);
                None
            }
        }
    }

    pub fn find_or_insert_callstack(
        &mut self,
        ctx: &mut TraceContext,
        iid: SourceCallstackId,
        lookup: Option<&dyn InternLookup>,
    ) -> Option<CallsiteId> {
        if let Some(&id) = self.callstack_ids.get(&iid) {
            return Some(id);
        }
        match lookup.and_then(|l| l.get_callstack(iid)) {
            Some(frame_ids) => self.add_callstack(ctx, iid, frame_ids, lookup),
            None => {
                ctx.storage.increment_stat(Stat::StackProfileInvalidCallstackId);
                debug!("Unknown callstack id {}", iid);
                None
            }
        }
    }

    /// Intern the string behind `iid`. Id 0 is the empty string.
    pub fn find_and_intern_string(
        &mut self,
        ctx: &mut TraceContext,
        iid: SourceStringId,
        kind: InternedStringKind,
        lookup: Option<&dyn InternLookup>,
    ) -> Option<StringId> {
        match self.find_string(iid, kind, lookup) {
            Some(bytes) => Some(ctx.storage.strings.intern_bytes(&bytes)),
            None => {
                ctx.storage.increment_stat(Stat::StackProfileInvalidStringId);
                debug!("Unknown {:?} string id {}", kind, iid);
                None
            }
        }
    }

    /// Forget everything keyed by sequence-local ids.
    ///
    /// Called once a dump is committed: the next dump on this sequence may
    /// reuse the same small ids for different content.
    pub fn clear_indices(&mut self) {
        self.strings.clear();
        self.mapping_ids.clear();
        self.frame_ids.clear();
        self.callstack_ids.clear();
    }

    fn find_string(
        &self,
        iid: SourceStringId,
        kind: InternedStringKind,
        lookup: Option<&dyn InternLookup>,
    ) -> Option<Vec<u8>> {
        if iid == 0 {
            return Some(Vec::new());
        }
        if let Some(s) = self.strings.get(&iid) {
            return Some(s.clone());
        }
        lookup.and_then(|l| l.get_string(iid, kind)).map(<[u8]>::to_vec)
    }
}
