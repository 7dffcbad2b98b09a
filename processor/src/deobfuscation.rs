//! ProGuard/R8 deobfuscation of frames and heap graphs
//!
//! Mappings are buffered and applied at end of file, once every frame and
//! heap graph row they could rename exists.

use crate::context::TraceContext;
use crate::heap_graph::HeapGraphTracker;
use crate::java_types::{denormalize_type_name, normalize_type_name};
use crate::profiling::package::{package_from_location, PackageLocation, MEMFD_PACKAGE};
use crate::profiling::registry::NameInPackage;
use crate::storage::TraceStorage;
use std::collections::{BTreeMap, HashSet};
use tracery_shared::types::events::{DeobfuscationMapping, ObfuscatedClass, ObfuscatedMember};
use tracery_shared::types::ids::{CallsiteId, FrameId, StringId, UniquePid};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct Deobfuscator {
    mappings: Vec<DeobfuscationMapping>,
}

impl Deobfuscator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mapping(&mut self, mapping: DeobfuscationMapping) {
        self.mappings.push(mapping);
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Apply every buffered mapping.
    pub fn notify_end_of_file(&mut self, ctx: &mut TraceContext, heap_graph: &HeapGraphTracker) {
        if self.mappings.is_empty() {
            return;
        }
        if ctx.config.guess_java_packages {
            guess_packages(ctx);
        }
        for mapping in std::mem::take(&mut self.mappings) {
            info!(
                "Applying deobfuscation mapping for {:?} ({} classes)",
                mapping.package_name,
                mapping.obfuscated_classes.len()
            );
            apply_mapping(ctx, heap_graph, &mapping);
        }
    }
}

/// Member name with its class prefix, unless the mapping already gives one.
pub fn fully_qualified_deobfuscated_name(class: &ObfuscatedClass, member: &ObfuscatedMember) -> String {
    if member.deobfuscated_name.contains('.') {
        member.deobfuscated_name.clone()
    } else {
        format!("{}.{}", class.deobfuscated_name, member.deobfuscated_name)
    }
}

fn apply_mapping(ctx: &mut TraceContext, heap_graph: &HeapGraphTracker, mapping: &DeobfuscationMapping) {
    let package = (!mapping.package_name.is_empty()).then(|| ctx.storage.intern_string(&mapping.package_name));
    let memfd = ctx.storage.strings.lookup(MEMFD_PACKAGE);

    for class in &mapping.obfuscated_classes {
        deobfuscate_class(ctx, heap_graph, package, class);

        for member in &class.obfuscated_members {
            let merged = format!("{}.{}", class.obfuscated_name, member.obfuscated_name);
            let merged_id = ctx.storage.strings.lookup(&merged);
            let field_refs = merged_id
                .map(|id| heap_graph.rows_for_field(id).to_vec())
                .unwrap_or_default();
            let frames = match package {
                Some(package) => frames_for_member(ctx, &merged, merged_id, package, memfd),
                None => Vec::new(),
            };
            if frames.is_empty() && field_refs.is_empty() {
                continue;
            }

            let deobfuscated = ctx
                .storage
                .intern_string(&fully_qualified_deobfuscated_name(class, member));
            for frame in frames {
                ctx.storage.frames[frame].deobfuscated_name = Some(deobfuscated);
            }
            for reference in field_refs {
                ctx.storage.heap_graph_references[reference].deobfuscated_field_name = Some(deobfuscated);
            }
        }
    }
}

/// Frames of `package` (or memfd dex code) for the member `merged`.
///
/// Falls back to frames whose name ends in `.{merged}` when the mapping
/// lists classes without their Java package.
fn frames_for_member(
    ctx: &TraceContext,
    merged: &str,
    merged_id: Option<StringId>,
    package: StringId,
    memfd: Option<StringId>,
) -> Vec<FrameId> {
    let packages = [Some(package), memfd];
    let mut frames = Vec::new();
    if let Some(name) = merged_id {
        for package in packages.into_iter().flatten() {
            frames.extend_from_slice(ctx.registry.java_frames_for_name(&NameInPackage { name, package }));
        }
    }
    if !frames.is_empty() {
        return frames;
    }

    let suffix = format!(".{merged}");
    for package in packages.into_iter().flatten() {
        for (name, ids) in ctx.registry.java_frames_in_package(package) {
            if ctx.storage.get_string(name).ends_with(&suffix) {
                frames.extend_from_slice(ids);
            }
        }
    }
    frames.sort();
    frames.dedup();
    frames
}

fn deobfuscate_class(
    ctx: &mut TraceContext,
    heap_graph: &HeapGraphTracker,
    package: Option<StringId>,
    class: &ObfuscatedClass,
) {
    let Some(obfuscated) = ctx.storage.strings.lookup(&class.obfuscated_name) else {
        return;
    };
    let mut rows = Vec::new();
    if package.is_some() {
        rows.extend_from_slice(heap_graph.rows_for_type(package, obfuscated));
    }
    // Classes dumped without a usable location match regardless of package.
    rows.extend_from_slice(heap_graph.rows_for_type(None, obfuscated));

    for row in rows {
        let name = ctx.storage.get_string(ctx.storage.heap_graph_classes[row].name);
        let deobfuscated = denormalize_type_name(&normalize_type_name(name), &class.deobfuscated_name);
        let deobfuscated = ctx.storage.intern_string(&deobfuscated);
        ctx.storage.heap_graph_classes[row].deobfuscated_name = Some(deobfuscated);
    }
}

/// Attribute Java frames with no package of their own to the app of the
/// first process whose samples reference them.
pub fn guess_packages(ctx: &mut TraceContext) {
    let pending = frames_without_package(&ctx.storage);
    if pending.is_empty() {
        return;
    }

    let storage = &ctx.storage;
    let mut owners: BTreeMap<FrameId, UniquePid> = BTreeMap::new();
    for alloc in &storage.heap_profile_allocations {
        attribute_callsite(storage, &pending, &mut owners, alloc.upid, alloc.callsite_id);
    }
    let samples = storage
        .perf_samples
        .iter()
        .filter_map(|s| Some((s.utid, s.callsite_id?)))
        .chain(storage.cpu_profile_samples.iter().map(|s| (s.utid, s.callsite_id)));
    for (utid, callsite) in samples {
        if let Some(upid) = storage.threads.get(utid).and_then(|t| t.upid) {
            attribute_callsite(storage, &pending, &mut owners, upid, callsite);
        }
    }

    let modulus = ctx.config.app_uid_modulus;
    let mut guessed = Vec::new();
    for (frame, upid) in owners {
        let Some(process) = storage.processes.get(upid) else {
            continue;
        };
        let Some(app_id) = process.android_appid.or(process.uid.map(|uid| uid % modulus)) else {
            debug!("No uid for pid {}, cannot guess package of frame {}", process.pid, frame);
            continue;
        };
        match ctx.process_tracker.packages_for_uid(app_id).first() {
            Some(&package) => guessed.push((
                NameInPackage {
                    name: storage.frames[frame].name,
                    package,
                },
                frame,
            )),
            None => debug!("No package for uid {}", app_id),
        }
    }

    debug!("Guessed packages for {} of {} frames", guessed.len(), pending.len());
    for (key, frame) in guessed {
        ctx.registry.add_java_frame(key, frame);
    }
}

fn frames_without_package(storage: &TraceStorage) -> HashSet<FrameId> {
    storage
        .frames
        .iter()
        .filter(|(_, frame)| storage.get_string(frame.name).contains('.'))
        .filter(|(_, frame)| {
            let Some(mapping) = storage.mappings.get(frame.mapping) else {
                return false;
            };
            let location = storage.get_string(mapping.name);
            !location.starts_with("/memfd:")
                && !matches!(package_from_location(location), PackageLocation::Known(_))
        })
        .map(|(id, _)| id)
        .collect()
}

fn attribute_callsite(
    storage: &TraceStorage,
    pending: &HashSet<FrameId>,
    owners: &mut BTreeMap<FrameId, UniquePid>,
    upid: UniquePid,
    callsite: CallsiteId,
) {
    for (_, row) in storage.callsite_chain(callsite) {
        if pending.contains(&row.frame_id) {
            owners.entry(row.frame_id).or_insert(upid);
        }
    }
}
