//! Heap profile dumps to allocation deltas
//!
//! Dumps carry cumulative per-callstack counters. Each committed dump emits
//! only what changed since the previous one, as an allocation row (positive)
//! and a free row (negative) per callsite.

use super::sequence_tracker::{InternLookup, SequenceStackProfileTracker};
use crate::context::TraceContext;
use crate::storage::Stat;
use std::collections::HashMap;
use tracery_shared::types::events::{Pid, Timestamp};
use tracery_shared::types::ids::{CallsiteId, SequenceId, SourceCallstackId, StringId, UniquePid};
use tracery_shared::types::profile::HeapProfileAllocationRow;
use tracing::{debug, warn};

/// One sample of a dump, held until its dump is complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAllocation {
    pub pid: Pid,
    pub timestamp: Timestamp,
    pub heap_name: StringId,
    pub callstack_id: SourceCallstackId,
    pub self_allocated: u64,
    pub self_freed: u64,
    pub alloc_count: u64,
    pub free_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Totals {
    count: i64,
    size: i64,
}

impl Totals {
    /// `None` when a counter does not fit the signed row columns.
    fn new(count: u64, size: u64) -> Option<Self> {
        Some(Self {
            count: i64::try_from(count).ok()?,
            size: i64::try_from(size).ok()?,
        })
    }

    fn checked_add(self, rhs: Totals) -> Option<Totals> {
        Some(Totals {
            count: self.count.checked_add(rhs.count)?,
            size: self.size.checked_add(rhs.size)?,
        })
    }

    fn checked_sub(self, rhs: Totals) -> Option<Totals> {
        Some(Totals {
            count: self.count.checked_sub(rhs.count)?,
            size: self.size.checked_sub(rhs.size)?,
        })
    }

    fn is_negative(self) -> bool {
        self.count < 0 || self.size < 0
    }

    fn is_zero(self) -> bool {
        self.count == 0 && self.size == 0
    }
}

type CallsiteKey = (UniquePid, StringId, CallsiteId);
type SourceKey = (UniquePid, StringId, SourceCallstackId);

#[derive(Debug, Default)]
struct SequenceState {
    prev_index: Option<u64>,
    pending: Vec<SourceAllocation>,

    // Last committed totals; frees are kept positive.
    prev_alloc: HashMap<CallsiteKey, Totals>,
    prev_free: HashMap<CallsiteKey, Totals>,

    // Callsite each source callstack resolved to on its last sample
    last_callsite: HashMap<SourceKey, CallsiteId>,
    alloc_correction: HashMap<SourceKey, Totals>,
    free_correction: HashMap<SourceKey, Totals>,
}

#[derive(Debug, Default)]
pub struct HeapProfileTracker {
    sequences: HashMap<SequenceId, SequenceState>,
}

impl HeapProfileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `index` follows the previous packet of the sequence.
    pub fn set_profile_packet_index(&mut self, ctx: &mut TraceContext, seq: SequenceId, index: u64) {
        let state = self.sequences.entry(seq).or_default();
        let dropped = match state.prev_index {
            // Indices start at zero.
            None => index != 0,
            Some(prev) => prev.checked_add(1) != Some(index),
        };
        if dropped {
            if let Some(prev) = state.prev_index {
                warn!("Missing heap profile packets between {} and {} on sequence {}", prev, index, seq);
            }
            ctx.storage.increment_stat(Stat::HeapProfdMissingPacket);
        }
        state.prev_index = Some(index);
    }

    pub fn store_allocation(&mut self, seq: SequenceId, alloc: SourceAllocation) {
        self.sequences.entry(seq).or_default().pending.push(alloc);
    }

    /// Turn every pending sample of `seq` into delta rows.
    pub fn commit_allocations(
        &mut self,
        ctx: &mut TraceContext,
        seq: SequenceId,
        stack: &mut SequenceStackProfileTracker,
        lookup: Option<&dyn InternLookup>,
    ) {
        let Some(state) = self.sequences.get_mut(&seq) else {
            return;
        };
        let pending = std::mem::take(&mut state.pending);
        for alloc in &pending {
            add_allocation(state, ctx, stack, alloc, lookup);
        }
    }

    /// Commit the completed dump and drop the sequence-local ids it used.
    pub fn finalize_profile(
        &mut self,
        ctx: &mut TraceContext,
        seq: SequenceId,
        stack: &mut SequenceStackProfileTracker,
        lookup: Option<&dyn InternLookup>,
    ) {
        self.commit_allocations(ctx, seq, stack, lookup);
        stack.clear_indices();
    }

    pub fn notify_end_of_file(&mut self, ctx: &mut TraceContext) {
        for (seq, state) in &self.sequences {
            if !state.pending.is_empty() {
                warn!("Heap profile on sequence {} was never finalized", seq);
                ctx.storage.increment_stat(Stat::HeapProfdNonFinalizedProfile);
            }
        }
    }
}

fn add_allocation(
    state: &mut SequenceState,
    ctx: &mut TraceContext,
    stack: &mut SequenceStackProfileTracker,
    alloc: &SourceAllocation,
    lookup: Option<&dyn InternLookup>,
) {
    let upid = ctx
        .process_tracker
        .get_or_create_process(&mut ctx.storage, alloc.pid);
    let Some(callsite) = stack.find_or_insert_callstack(ctx, alloc.callstack_id, lookup) else {
        return;
    };

    let key = (upid, alloc.heap_name, callsite);
    let source_key = (upid, alloc.heap_name, alloc.callstack_id);

    let prev_alloc = state.prev_alloc.get(&key).copied().unwrap_or_default();
    let prev_free = state.prev_free.get(&key).copied().unwrap_or_default();

    // A source id resolving to a different callsite than last time has had
    // its counters restarted; continue from that callsite's totals.
    if state.last_callsite.insert(source_key, callsite) != Some(callsite) {
        state.alloc_correction.insert(source_key, prev_alloc);
        state.free_correction.insert(source_key, prev_free);
    }

    let alloc_correction = state.alloc_correction.get(&source_key).copied().unwrap_or_default();
    let free_correction = state.free_correction.get(&source_key).copied().unwrap_or_default();
    let alloc_step = monotonic_step(alloc.alloc_count, alloc.self_allocated, alloc_correction, prev_alloc);
    let free_step = monotonic_step(alloc.free_count, alloc.self_freed, free_correction, prev_free);
    let (Some((alloc_total, alloc_delta)), Some((free_total, free_delta))) = (alloc_step, free_step)
    else {
        debug!(
            "Non-monotonous heap counters for callstack {} of pid {}",
            alloc.callstack_id, alloc.pid
        );
        ctx.storage
            .increment_indexed_stat(Stat::HeapProfdMalformedPacket, upid.0 as i64);
        return;
    };

    if !alloc_delta.is_zero() {
        ctx.storage.heap_profile_allocations.push(HeapProfileAllocationRow {
            ts: alloc.timestamp,
            upid,
            heap_name: alloc.heap_name,
            callsite_id: callsite,
            count: alloc_delta.count,
            size: alloc_delta.size,
        });
    }
    // The ART heap does not report frees.
    let is_art = ctx.storage.get_string(alloc.heap_name) == ctx.config.art_heap_name;
    if !free_delta.is_zero() && !is_art {
        ctx.storage.heap_profile_allocations.push(HeapProfileAllocationRow {
            ts: alloc.timestamp,
            upid,
            heap_name: alloc.heap_name,
            callsite_id: callsite,
            count: -free_delta.count,
            size: -free_delta.size,
        });
    }

    state.prev_alloc.insert(key, alloc_total);
    state.prev_free.insert(key, free_total);
}

/// Corrected cumulative total and its delta from `prev`. `None` when a
/// counter overflows or goes backwards.
fn monotonic_step(count: u64, size: u64, correction: Totals, prev: Totals) -> Option<(Totals, Totals)> {
    let total = Totals::new(count, size)?.checked_add(correction)?;
    let delta = total.checked_sub(prev)?;
    (!delta.is_negative()).then_some((total, delta))
}
