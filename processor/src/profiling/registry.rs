//! Session-wide stack profile deduplication
//!
//! Packet sequences number their mappings, frames and callstacks
//! independently. The registry is the shared second-level index that lets a
//! sequence find rows another sequence already created, so identical content
//! collapses to one row no matter where it was first seen.

use super::package::{package_from_location, PackageLocation, MEMFD_PACKAGE};
use crate::metrics::{DEDUP_HITS_TOTAL, ROWS_INTERNED_TOTAL};
use crate::storage::{Stat, TraceStorage};
use std::collections::HashMap;
use tracery_shared::types::ids::{CallsiteId, FrameId, MappingId, StringId};
use tracery_shared::types::profile::{CallsiteRow, FrameRow, MappingRow};
use tracing::debug;

/// Key clustering Java frames by name and owning app package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameInPackage {
    pub name: StringId,
    pub package: StringId,
}

#[derive(Debug, Default)]
pub struct StackProfileRegistry {
    mappings: HashMap<(StringId, StringId), Vec<MappingId>>,
    frames: HashMap<(MappingId, u64), Vec<FrameId>>,
    callsites: HashMap<CallsiteRow, CallsiteId>,
    java_frames: HashMap<NameInPackage, Vec<FrameId>>,
}

impl StackProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mappings registered under `(name, build_id)`
    pub fn find_mapping_row(&self, name: StringId, build_id: StringId) -> &[MappingId] {
        self.mappings
            .get(&(name, build_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn insert_mapping_id(&mut self, name: StringId, build_id: StringId, id: MappingId) {
        self.mappings.entry((name, build_id)).or_default().push(id);
    }

    /// Frames registered under `(mapping, rel_pc)`
    pub fn find_frame_ids(&self, mapping: MappingId, rel_pc: u64) -> &[FrameId] {
        self.frames
            .get(&(mapping, rel_pc))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn insert_frame_row(&mut self, mapping: MappingId, rel_pc: u64, id: FrameId) {
        self.frames.entry((mapping, rel_pc)).or_default().push(id);
    }

    pub fn java_frames_for_name(&self, key: &NameInPackage) -> &[FrameId] {
        self.java_frames.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every Java frame name indexed under `package`
    pub fn java_frames_in_package(
        &self,
        package: StringId,
    ) -> impl Iterator<Item = (StringId, &[FrameId])> + '_ {
        self.java_frames
            .iter()
            .filter(move |(key, _)| key.package == package)
            .map(|(key, frames)| (key.name, frames.as_slice()))
    }

    pub fn add_java_frame(&mut self, key: NameInPackage, frame: FrameId) {
        let frames = self.java_frames.entry(key).or_default();
        if !frames.contains(&frame) {
            frames.push(frame);
        }
    }

    /// Mapping row equal to `row`, created if no such row exists yet.
    pub fn intern_mapping(&mut self, storage: &mut TraceStorage, row: MappingRow) -> MappingId {
        if let Some(id) = self.find_mapping(storage, &row) {
            DEDUP_HITS_TOTAL.with_label_values(&["mapping", "global"]).inc();
            return id;
        }
        let (name, build_id) = (row.name, row.build_id);
        let id = storage.mappings.insert(row);
        self.insert_mapping_id(name, build_id, id);
        ROWS_INTERNED_TOTAL.with_label_values(&["mapping"]).inc();
        id
    }

    /// Existing mapping whose every field matches `row`.
    ///
    /// Rows sharing name and build id can still differ in offsets, so each
    /// candidate is compared in full.
    pub fn find_mapping(&self, storage: &TraceStorage, row: &MappingRow) -> Option<MappingId> {
        self.find_mapping_row(row.name, row.build_id)
            .iter()
            .copied()
            .find(|&id| storage.mappings.get(id) == Some(row))
    }

    /// Frame for `name` at `rel_pc` in `mapping`, created if needed.
    ///
    /// Newly created Java frames are also indexed by package for later
    /// deobfuscation.
    pub fn intern_frame(
        &mut self,
        storage: &mut TraceStorage,
        mapping: MappingId,
        rel_pc: u64,
        name: StringId,
    ) -> FrameId {
        let row = FrameRow::new(name, mapping, rel_pc);
        if let Some(id) = self.find_frame(storage, &row) {
            DEDUP_HITS_TOTAL.with_label_values(&["frame", "global"]).inc();
            return id;
        }
        let id = storage.frames.insert(row);
        self.insert_frame_row(mapping, rel_pc, id);
        ROWS_INTERNED_TOTAL.with_label_values(&["frame"]).inc();
        self.index_java_frame(storage, id);
        id
    }

    pub fn find_frame(&self, storage: &TraceStorage, row: &FrameRow) -> Option<FrameId> {
        self.find_frame_ids(row.mapping, row.rel_pc)
            .iter()
            .copied()
            .find(|&id| storage.frames.get(id).map_or(false, |f| f.same_location(row)))
    }

    /// Callsite for `frame` below `parent`, created if needed.
    pub fn intern_callsite(
        &mut self,
        storage: &mut TraceStorage,
        parent: Option<CallsiteId>,
        frame: FrameId,
        depth: u32,
    ) -> CallsiteId {
        let row = CallsiteRow {
            depth,
            parent_id: parent,
            frame_id: frame,
        };
        if let Some(&id) = self.callsites.get(&row) {
            DEDUP_HITS_TOTAL.with_label_values(&["callsite", "global"]).inc();
            return id;
        }
        let id = storage.callsites.insert(row);
        self.callsites.insert(row, id);
        ROWS_INTERNED_TOTAL.with_label_values(&["callsite"]).inc();
        id
    }

    /// Register `frame` under its `(name, package)` key if it looks like a
    /// Java frame and its mapping names an app or memfd dex.
    fn index_java_frame(&mut self, storage: &mut TraceStorage, frame: FrameId) {
        let row = &storage.frames[frame];
        let name = row.name;
        if !storage.get_string(name).contains('.') {
            return;
        }
        let Some(mapping) = storage.mappings.get(row.mapping) else {
            return;
        };
        let location = storage.get_string(mapping.name).to_string();
        let package = match package_from_location(&location) {
            PackageLocation::Known(package) => package,
            PackageLocation::Unparseable => {
                debug!("Failed to parse package from {}", location);
                storage.increment_stat(Stat::HeapGraphLocationParseError);
                return;
            }
            PackageLocation::NotAnApp if location.starts_with("/memfd:") => MEMFD_PACKAGE.to_string(),
            PackageLocation::NotAnApp => return,
        };
        let package = storage.intern_string(&package);
        self.add_java_frame(NameInPackage { name, package }, frame);
    }
}
