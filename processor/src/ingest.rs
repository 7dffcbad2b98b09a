//! Packet ingestion driver
//!
//! Processing runs in two phases. `parse_packet` handles packets in arrival
//! order and only resolves what it can locally; `notify_end_of_file` then
//! finalizes pending dumps and applies the passes that need the whole trace
//! (address spaces, deobfuscation, symbolization checks).

use crate::android_log::{insert_event, AndroidLogParser};
use crate::config::ProcessorConfig;
use crate::context::TraceContext;
use crate::deobfuscation::Deobfuscator;
use crate::export::TraceSummary;
use crate::heap_graph::HeapGraphTracker;
use crate::metrics::{END_OF_FILE_DURATION, PACKETS_TOTAL};
use crate::profiling::address_space::VirtualAddressSpace;
use crate::profiling::heap_profile::{HeapProfileTracker, SourceAllocation};
use crate::profiling::sequence_tracker::InternLookup;
use crate::profiling::symbols::parse_module_symbols;
use crate::sequence::{EmbeddedInternLookup, PacketSequenceState};
use crate::storage::{Stat, TraceStorage};
use std::collections::HashMap;
use tracery_shared::types::events::{
    MmapEvent, PacketData, PerfSample, ProcessTree, ProfilePacket, StreamingProfilePacket,
    Timestamp, TracePacket,
};
use tracery_shared::types::ids::SequenceId;
use tracery_shared::types::profile::{CpuProfileStackSampleRow, MappingRow, MmapRow, PerfSampleRow};
use tracery_shared::utils::time::micros_to_nanos;
use tracing::{debug, info, warn};

/// Mappings here are pushed by developers and usually lack build ids.
const TMP_DIR: &str = "/data/local/tmp/";

/// Callstack id the perf producer uses for samples without a userspace stack
const EMPTY_CALLSTACK_IID: u64 = 1;

pub struct TraceProcessor {
    ctx: TraceContext,
    sequences: HashMap<SequenceId, PacketSequenceState>,
    heap_profiles: HeapProfileTracker,
    heap_graphs: HeapGraphTracker,
    deobfuscator: Deobfuscator,
    address_space: Option<VirtualAddressSpace>,
    packets: u64,
}

impl TraceProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            ctx: TraceContext::new(config),
            sequences: HashMap::new(),
            heap_profiles: HeapProfileTracker::new(),
            heap_graphs: HeapGraphTracker::new(),
            deobfuscator: Deobfuscator::new(),
            address_space: None,
            packets: 0,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &TraceContext {
        &self.ctx
    }

    pub fn storage(&self) -> &TraceStorage {
        &self.ctx.storage
    }

    /// Available once `notify_end_of_file` has run
    pub fn address_space(&self) -> Option<&VirtualAddressSpace> {
        self.address_space.as_ref()
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_storage(&self.ctx.storage)
    }

    pub fn packets_parsed(&self) -> u64 {
        self.packets
    }

    pub fn parse_packet(&mut self, packet: &TracePacket) {
        self.packets += 1;
        PACKETS_TOTAL.with_label_values(&[packet.kind()]).inc();

        let seq = packet.sequence_id;
        let state = self
            .sequences
            .entry(seq)
            .or_insert_with(|| PacketSequenceState::new(seq));
        if packet.incremental_state_cleared {
            state.on_incremental_state_cleared();
        }
        if let Some(defaults) = &packet.defaults {
            state.update_defaults(defaults.clone());
        }
        if let Some(interned) = &packet.interned_data {
            state.add_interned_data(interned);
        }

        let Some(data) = &packet.data else {
            return;
        };
        let ts = packet.timestamp();
        match data {
            PacketData::ProfilePacket(profile) => self.parse_profile_packet(seq, profile),
            PacketData::StreamingProfilePacket(streaming) => self.parse_streaming_profile(seq, ts, streaming),
            PacketData::PerfSample(sample) => self.parse_perf_sample(seq, ts, sample),
            PacketData::ModuleSymbols(symbols) => parse_module_symbols(&mut self.ctx, symbols),
            PacketData::DeobfuscationMapping(mapping) => {
                if self.ctx.config.deobfuscate {
                    self.deobfuscator.add_mapping(mapping.clone());
                }
            }
            PacketData::HeapGraph(graph) => self.heap_graphs.add_packet(&mut self.ctx, seq, ts, graph),
            PacketData::ProcessTree(tree) => self.parse_process_tree(tree),
            PacketData::PackagesList(list) => {
                for package in &list.packages {
                    self.ctx.process_tracker.add_package(&mut self.ctx.storage, package);
                }
            }
            PacketData::Mmap(mmap) => self.parse_mmap(ts, mmap),
            PacketData::AndroidLog(log) => {
                for event in &log.events {
                    self.ctx.storage.increment_stat(Stat::AndroidLogNumTotal);
                    insert_event(&mut self.ctx, event);
                }
            }
        }
    }

    /// Import a logcat text dump with the configured year.
    pub fn parse_logcat(&mut self, text: &str) -> usize {
        AndroidLogParser::new(self.ctx.config.android_log_year).parse_text(&mut self.ctx, text)
    }

    /// Run the whole-trace passes. Call once, after the last packet.
    pub fn notify_end_of_file(&mut self) {
        let timer = END_OF_FILE_DURATION.start_timer();

        self.heap_profiles.notify_end_of_file(&mut self.ctx);
        self.heap_graphs.notify_end_of_file(&mut self.ctx);
        self.address_space = Some(VirtualAddressSpace::from_mmaps(&self.ctx.storage.mmaps));
        if self.ctx.config.deobfuscate {
            self.deobfuscator
                .notify_end_of_file(&mut self.ctx, &self.heap_graphs);
        }
        check_tmp_build_ids(&mut self.ctx);

        timer.observe_duration();
        info!(
            "Processed {} packets on {} sequences",
            self.packets,
            self.sequences.len()
        );
    }

    fn parse_profile_packet(&mut self, seq: SequenceId, packet: &ProfilePacket) {
        let Self {
            ctx,
            sequences,
            heap_profiles,
            ..
        } = self;
        let Some(state) = sequences.get_mut(&seq) else {
            return;
        };
        heap_profiles.set_profile_packet_index(ctx, seq, packet.index);

        let embedded = EmbeddedInternLookup::new(packet);
        let lookup: Option<&dyn InternLookup> = Some(&embedded);
        let stack = &mut state.stack_profile;
        for string in &packet.strings {
            stack.add_string(string.iid, string.value.as_bytes());
        }
        for mapping in &packet.mappings {
            stack.add_mapping(ctx, mapping.iid, &mapping.mapping, lookup);
        }
        for frame in &packet.frames {
            stack.add_frame(ctx, frame.iid, &frame.frame, lookup);
        }
        for callstack in &packet.callstacks {
            stack.add_callstack(ctx, callstack.iid, &callstack.frame_ids, lookup);
        }

        for dump in &packet.process_dumps {
            let heap_name = dump.heap_name.as_deref().unwrap_or(&ctx.config.default_heap_name);
            let heap_name = ctx.storage.intern_string(heap_name);
            for sample in &dump.samples {
                heap_profiles.store_allocation(
                    seq,
                    SourceAllocation {
                        pid: dump.pid,
                        timestamp: dump.timestamp,
                        heap_name,
                        callstack_id: sample.callstack_id,
                        self_allocated: sample.self_allocated,
                        self_freed: sample.self_freed,
                        alloc_count: sample.alloc_count,
                        free_count: sample.free_count,
                    },
                );
            }
        }

        if !packet.continued {
            heap_profiles.finalize_profile(ctx, seq, stack, lookup);
        }
    }

    fn parse_streaming_profile(&mut self, seq: SequenceId, ts: Timestamp, packet: &StreamingProfilePacket) {
        let ctx = &mut self.ctx;
        if packet.callstack_iid.len() != packet.timestamp_delta_us.len() {
            debug!(
                "Streaming profile with {} callstacks but {} timestamps",
                packet.callstack_iid.len(),
                packet.timestamp_delta_us.len()
            );
            ctx.storage.increment_stat(Stat::StackProfileParserError);
            return;
        }
        let Some(state) = self.sequences.get_mut(&seq) else {
            return;
        };
        let generation = state.current_generation();
        let defaults = generation.defaults().cloned().unwrap_or_default();
        let utid = ctx
            .process_tracker
            .update_thread(&mut ctx.storage, defaults.tid.unwrap_or(0), defaults.pid);
        let lookup: &dyn InternLookup = &*generation;

        let mut ts = ts;
        for (&iid, &delta_us) in packet.callstack_iid.iter().zip(&packet.timestamp_delta_us) {
            ts += micros_to_nanos(delta_us);
            let Some(callsite_id) = state.stack_profile.find_or_insert_callstack(ctx, iid, Some(lookup)) else {
                continue;
            };
            ctx.storage.cpu_profile_samples.push(CpuProfileStackSampleRow {
                ts,
                callsite_id,
                utid,
            });
        }
    }

    fn parse_perf_sample(&mut self, seq: SequenceId, ts: Timestamp, sample: &PerfSample) {
        let ctx = &mut self.ctx;
        let Some(state) = self.sequences.get_mut(&seq) else {
            return;
        };
        let utid = ctx
            .process_tracker
            .update_thread(&mut ctx.storage, sample.tid, Some(sample.pid));

        let callsite_id = match sample.callstack_iid {
            None => None,
            Some(iid) => {
                let generation = state.current_generation();
                let lookup: &dyn InternLookup = &*generation;
                let callsite = state.stack_profile.find_or_insert_callstack(ctx, iid, Some(lookup));
                // Counter-only profiles reference an empty callstack.
                if callsite.is_none() && iid != EMPTY_CALLSTACK_IID {
                    ctx.storage.increment_stat(Stat::PerfSamplesSkipped);
                    return;
                }
                callsite
            }
        };
        ctx.storage.perf_samples.push(PerfSampleRow {
            ts,
            utid,
            cpu: sample.cpu,
            callsite_id,
        });
    }

    fn parse_process_tree(&mut self, tree: &ProcessTree) {
        let ctx = &mut self.ctx;
        let modulus = ctx.config.app_uid_modulus;
        for process in &tree.processes {
            let upid = ctx
                .process_tracker
                .get_or_create_process(&mut ctx.storage, process.pid);
            if let Some(name) = process.cmdline.first() {
                ctx.process_tracker
                    .set_process_name(&mut ctx.storage, upid, name);
            }
            if let Some(uid) = process.uid {
                ctx.process_tracker
                    .set_process_uid(&mut ctx.storage, upid, uid, modulus);
            }
        }
        for thread in &tree.threads {
            ctx.process_tracker
                .update_thread(&mut ctx.storage, thread.tid, Some(thread.tgid));
        }
    }

    fn parse_mmap(&mut self, ts: Timestamp, mmap: &MmapEvent) {
        let ctx = &mut self.ctx;
        let Some(end) = mmap.start.checked_add(mmap.len).filter(|_| mmap.len > 0) else {
            debug!("Invalid mmap of {} at {:#x}+{:#x}", mmap.filename, mmap.start, mmap.len);
            ctx.storage.increment_stat(Stat::MmapInvalidRange);
            return;
        };
        let upid = ctx
            .process_tracker
            .get_or_create_process(&mut ctx.storage, mmap.pid);
        let row = MappingRow {
            build_id: ctx.storage.intern_build_id(mmap.build_id.as_bytes()),
            exact_offset: mmap.pgoff,
            start_offset: mmap.pgoff,
            start: mmap.start,
            end,
            load_bias: 0,
            name: ctx.storage.intern_string(&mmap.filename),
        };
        let mapping = ctx.registry.intern_mapping(&mut ctx.storage, row);
        ctx.storage.mmaps.push(MmapRow {
            ts,
            upid,
            start: mmap.start,
            end,
            mapping,
        });
    }
}

/// Count, once, that binaries under the tmp dir could not be symbolized.
fn check_tmp_build_ids(ctx: &mut TraceContext) {
    let storage = &ctx.storage;
    let missing = storage
        .mappings
        .iter()
        .filter(|(_, m)| m.build_id.is_empty() && storage.get_string(m.name).starts_with(TMP_DIR))
        .count();
    if missing > 0 {
        warn!("{} mappings under {} have no build id", missing, TMP_DIR);
        ctx.storage
            .increment_stat(Stat::SymbolizationTmpBuildIdNotFound);
    }
}
