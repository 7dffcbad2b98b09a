//! Per-process address space history
//!
//! Built once from the mmap table after ingestion. Later mappings shadow the
//! overlapping parts of earlier ones, so every address resolves to at most
//! one mapping version.

use std::collections::HashMap;
use tracery_shared::address::{AddressRange, AddressRangeMap};
use tracery_shared::types::events::Timestamp;
use tracery_shared::types::ids::{MappingId, UniquePid};
use tracery_shared::types::profile::MmapRow;

/// A mapping as it was visible from `create_ts` over `range`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingVersion {
    pub id: MappingId,
    pub create_ts: Timestamp,
    pub range: AddressRange,
}

impl MappingVersion {
    /// Cut the version at `mid`, keeping `[mid, end)` and returning
    /// `[start, mid)`.
    pub fn split_front(&mut self, mid: u64) -> MappingVersion {
        assert!(
            self.range.start() < mid && mid < self.range.end(),
            "split point {mid:#x} outside {}",
            self.range
        );
        let front = MappingVersion {
            range: AddressRange::new(self.range.start(), mid),
            ..*self
        };
        self.range = AddressRange::new(mid, self.range.end());
        front
    }
}

#[derive(Debug, Default)]
pub struct VirtualAddressSpaceBuilder {
    mmaps: Vec<(UniquePid, MappingVersion)>,
}

impl VirtualAddressSpaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mmap(&mut self, row: &MmapRow) {
        if row.start >= row.end {
            return;
        }
        self.mmaps.push((
            row.upid,
            MappingVersion {
                id: row.mapping,
                create_ts: row.ts,
                range: AddressRange::new(row.start, row.end),
            },
        ));
    }

    pub fn build(mut self) -> VirtualAddressSpace {
        // Stable: mmaps at the same timestamp apply in arrival order.
        self.mmaps.sort_by_key(|(_, version)| version.create_ts);

        let mut processes: HashMap<UniquePid, AddressRangeMap<MappingVersion>> = HashMap::new();
        for (upid, version) in self.mmaps {
            processes.entry(upid).or_default().trim_overlaps_and_emplace_with(
                version.range,
                version,
                |piece, old| {
                    let mut rest = *old;
                    if piece.start() == old.range.start() {
                        rest.split_front(piece.end())
                    } else {
                        rest.split_front(piece.start());
                        rest
                    }
                },
            );
        }
        VirtualAddressSpace { processes }
    }
}

#[derive(Debug, Default)]
pub struct VirtualAddressSpace {
    processes: HashMap<UniquePid, AddressRangeMap<MappingVersion>>,
}

impl VirtualAddressSpace {
    pub fn from_mmaps<'a>(rows: impl IntoIterator<Item = &'a MmapRow>) -> Self {
        let mut builder = VirtualAddressSpaceBuilder::new();
        for row in rows {
            builder.add_mmap(row);
        }
        builder.build()
    }

    /// Latest mapping covering `address` in `upid`
    pub fn find_mapping(&self, upid: UniquePid, address: u64) -> Option<&MappingVersion> {
        self.processes.get(&upid)?.find(address).map(|(_, v)| v)
    }

    /// Mapping covering `address` that already existed at `ts`
    pub fn find_mapping_at(&self, upid: UniquePid, ts: Timestamp, address: u64) -> Option<&MappingVersion> {
        self.find_mapping(upid, address)
            .filter(|version| version.create_ts <= ts)
    }

    pub fn mappings(&self, upid: UniquePid) -> impl Iterator<Item = &MappingVersion> {
        self.processes
            .get(&upid)
            .into_iter()
            .flat_map(|map| map.iter().map(|(_, v)| v))
    }
}
