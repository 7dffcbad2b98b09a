//! Java heap graph assembly
//!
//! A heap dump arrives as a run of chunks on one sequence. Types, objects and
//! roots are buffered until the last chunk, then written out as class, object
//! and reference rows with each object's distance from the nearest root.

use crate::context::TraceContext;
use crate::java_types::normalize_type_name;
use crate::profiling::package::{package_from_location, PackageLocation};
use crate::storage::Stat;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracery_shared::types::events::{HeapGraph, HeapGraphObject, HeapGraphRoot, Timestamp};
use tracery_shared::types::ids::{
    HeapGraphClassId, HeapGraphObjectId, HeapGraphReferenceId, InternId, SequenceId, StringId,
    UniquePid,
};
use tracery_shared::types::profile::{HeapGraphClassRow, HeapGraphObjectRow, HeapGraphReferenceRow};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct InternedType {
    name: String,
    location_id: Option<InternId>,
    object_size: u64,
}

#[derive(Debug, Default)]
struct SequenceGraphState {
    upid: Option<UniquePid>,
    ts: Timestamp,
    prev_index: Option<u64>,
    types: BTreeMap<InternId, InternedType>,
    locations: HashMap<InternId, String>,
    field_names: HashMap<InternId, String>,
    objects: Vec<HeapGraphObject>,
    roots: Vec<HeapGraphRoot>,
}

#[derive(Debug, Default)]
pub struct HeapGraphTracker {
    sequences: HashMap<SequenceId, SequenceGraphState>,
    class_to_rows: HashMap<(Option<StringId>, StringId), Vec<HeapGraphClassId>>,
    field_to_rows: HashMap<StringId, Vec<HeapGraphReferenceId>>,
}

impl HeapGraphTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one chunk; the final chunk of a dump writes the graph out.
    pub fn add_packet(&mut self, ctx: &mut TraceContext, seq: SequenceId, ts: Timestamp, graph: &HeapGraph) {
        let upid = ctx
            .process_tracker
            .get_or_create_process(&mut ctx.storage, graph.pid);
        let state = self.sequences.entry(seq).or_default();
        state.upid = Some(upid);
        state.ts = ts;

        let dropped = match state.prev_index {
            None => graph.index != 0,
            Some(prev) => prev.checked_add(1) != Some(graph.index),
        };
        if dropped {
            warn!("Missing heap graph packets before index {} on sequence {}", graph.index, seq);
            ctx.storage
                .increment_indexed_stat(Stat::HeapGraphMissingPacket, upid.0 as i64);
        }
        state.prev_index = Some(graph.index);

        for ty in &graph.types {
            state.types.insert(
                ty.id,
                InternedType {
                    name: ty.class_name.clone(),
                    location_id: ty.location_id,
                    object_size: ty.object_size,
                },
            );
        }
        for location in &graph.location_names {
            state.locations.insert(location.iid, location.value.to_string_lossy());
        }
        for field in &graph.field_names {
            state.field_names.insert(field.iid, field.value.to_string_lossy());
        }
        state.objects.extend(graph.objects.iter().cloned());
        state.roots.extend(graph.roots.iter().cloned());

        if !graph.continued {
            self.finalize_graph(ctx, seq);
        }
    }

    pub fn finalize_graph(&mut self, ctx: &mut TraceContext, seq: SequenceId) {
        let Some(state) = self.sequences.remove(&seq) else {
            return;
        };
        let Some(upid) = state.upid else {
            return;
        };

        let class_ids = self.write_classes(ctx, &state);
        let object_rows = write_objects(ctx, &state, upid, &class_ids);
        let edges = self.write_references(ctx, &state, upid, &object_rows);
        mark_roots(ctx, &state, &object_rows, &edges);

        debug!(
            "Heap graph of {} with {} objects finalized on sequence {}",
            upid,
            object_rows.len(),
            seq
        );
    }

    pub fn notify_end_of_file(&mut self, ctx: &mut TraceContext) {
        for (seq, state) in self.sequences.drain() {
            warn!("Heap graph on sequence {} was never finalized", seq);
            if let Some(upid) = state.upid {
                debug!("Dropping partial heap graph of {}", upid);
            }
            ctx.storage.increment_stat(Stat::HeapGraphNonFinalizedGraph);
        }
    }

    /// Class rows with bare name `name`, from `package` or, for `None`,
    /// from locations no package could be derived from.
    pub fn rows_for_type(&self, package: Option<StringId>, name: StringId) -> &[HeapGraphClassId] {
        self.class_to_rows
            .get(&(package, name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reference rows through the field `name` (`Class.field`)
    pub fn rows_for_field(&self, name: StringId) -> &[HeapGraphReferenceId] {
        self.field_to_rows
            .get(&name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn write_classes(
        &mut self,
        ctx: &mut TraceContext,
        state: &SequenceGraphState,
    ) -> HashMap<InternId, HeapGraphClassId> {
        let mut class_ids = HashMap::new();
        for (&iid, ty) in &state.types {
            let location = ty.location_id.and_then(|id| state.locations.get(&id));
            let row = HeapGraphClassRow {
                name: ctx.storage.intern_string(&ty.name),
                deobfuscated_name: None,
                location: location.map(|l| ctx.storage.intern_string(l)),
                object_size: ty.object_size,
            };
            let id = ctx.storage.heap_graph_classes.insert(row);
            class_ids.insert(iid, id);

            let package = match location.map(|l| package_from_location(l)) {
                Some(PackageLocation::Known(package)) => Some(ctx.storage.intern_string(&package)),
                Some(PackageLocation::Unparseable) => {
                    debug!("Failed to parse package from {:?}", location);
                    ctx.storage.increment_stat(Stat::HeapGraphLocationParseError);
                    None
                }
                Some(PackageLocation::NotAnApp) | None => None,
            };
            let normalized = ctx.storage.intern_string(normalize_type_name(&ty.name).name);
            self.class_to_rows
                .entry((package, normalized))
                .or_default()
                .push(id);
        }
        class_ids
    }

    fn write_references(
        &mut self,
        ctx: &mut TraceContext,
        state: &SequenceGraphState,
        upid: UniquePid,
        object_rows: &HashMap<u64, HeapGraphObjectId>,
    ) -> HashMap<HeapGraphObjectId, Vec<HeapGraphObjectId>> {
        let mut edges: HashMap<HeapGraphObjectId, Vec<HeapGraphObjectId>> = HashMap::new();
        for object in &state.objects {
            let Some(&owner) = object_rows.get(&object.id) else {
                continue;
            };
            if object.reference_field_id.len() != object.reference_object_id.len() {
                debug!("Object {} has mismatched reference lists", object.id);
                ctx.storage
                    .increment_indexed_stat(Stat::HeapGraphMalformedPacket, upid.0 as i64);
                continue;
            }
            for (field_id, &target) in object.reference_field_id.iter().zip(&object.reference_object_id) {
                let Some(field) = state.field_names.get(field_id) else {
                    ctx.storage
                        .increment_indexed_stat(Stat::HeapGraphInvalidStringId, upid.0 as i64);
                    continue;
                };
                let (field_type, field_name) = field.split_once(' ').unwrap_or(("", field.as_str()));
                let owned = match target {
                    0 => None,
                    id => {
                        let owned = object_rows.get(&id).copied();
                        if owned.is_none() {
                            debug!("Reference from {} to unknown object {}", object.id, id);
                        }
                        owned
                    }
                };

                let field_name = ctx.storage.intern_string(field_name);
                let row = HeapGraphReferenceRow {
                    owner_id: owner,
                    owned_id: owned,
                    field_name,
                    field_type_name: ctx.storage.intern_string(field_type),
                    deobfuscated_field_name: None,
                };
                let id = ctx.storage.heap_graph_references.insert(row);
                self.field_to_rows.entry(field_name).or_default().push(id);
                if let Some(owned) = owned {
                    edges.entry(owner).or_default().push(owned);
                }
            }
        }
        edges
    }
}

fn write_objects(
    ctx: &mut TraceContext,
    state: &SequenceGraphState,
    upid: UniquePid,
    class_ids: &HashMap<InternId, HeapGraphClassId>,
) -> HashMap<u64, HeapGraphObjectId> {
    let mut object_rows = HashMap::new();
    for object in &state.objects {
        let Some(&type_id) = class_ids.get(&object.type_id) else {
            debug!("Object {} has unknown type {}", object.id, object.type_id);
            ctx.storage
                .increment_indexed_stat(Stat::HeapGraphMalformedPacket, upid.0 as i64);
            continue;
        };
        let id = ctx.storage.heap_graph_objects.insert(HeapGraphObjectRow {
            upid,
            graph_sample_ts: state.ts,
            self_size: object.self_size,
            type_id,
            root_type: None,
            root_distance: None,
        });
        object_rows.insert(object.id, id);
    }
    object_rows
}

/// Label root objects and compute every reachable object's root distance.
fn mark_roots(
    ctx: &mut TraceContext,
    state: &SequenceGraphState,
    object_rows: &HashMap<u64, HeapGraphObjectId>,
    edges: &HashMap<HeapGraphObjectId, Vec<HeapGraphObjectId>>,
) {
    let objects = &mut ctx.storage.heap_graph_objects;
    let mut queue = VecDeque::new();
    for root in &state.roots {
        let root_type = ctx.storage.strings.intern(&root.root_type);
        for object_id in &root.object_ids {
            let Some(&row) = object_rows.get(object_id) else {
                continue;
            };
            objects[row].root_type = Some(root_type);
            if objects[row].root_distance.is_none() {
                objects[row].root_distance = Some(0);
                queue.push_back(row);
            }
        }
    }

    while let Some(row) = queue.pop_front() {
        let distance = objects[row].root_distance.unwrap_or(0);
        for &child in edges.get(&row).into_iter().flatten() {
            if objects[child].root_distance.is_none() {
                objects[child].root_distance = Some(distance + 1);
                queue.push_back(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;
    use tracery_shared::types::events::{HeapGraphType, InternedString};

    fn graph() -> HeapGraph {
        HeapGraph {
            pid: 7,
            index: 0,
            continued: false,
            types: vec![
                HeapGraphType {
                    id: 1,
                    class_name: "a.b".to_string(),
                    location_id: Some(1),
                    object_size: 16,
                },
                HeapGraphType {
                    id: 2,
                    class_name: "a.b[]".to_string(),
                    location_id: None,
                    object_size: 0,
                },
            ],
            objects: vec![
                HeapGraphObject {
                    id: 100,
                    type_id: 1,
                    self_size: 16,
                    reference_field_id: vec![1, 1],
                    reference_object_id: vec![101, 0],
                },
                HeapGraphObject {
                    id: 101,
                    type_id: 2,
                    self_size: 32,
                    reference_field_id: vec![1],
                    reference_object_id: vec![102],
                },
                HeapGraphObject {
                    id: 102,
                    type_id: 1,
                    self_size: 16,
                    ..HeapGraphObject::default()
                },
                HeapGraphObject {
                    id: 103,
                    type_id: 1,
                    self_size: 16,
                    ..HeapGraphObject::default()
                },
            ],
            roots: vec![HeapGraphRoot {
                object_ids: vec![100],
                root_type: "ROOT_JNI_GLOBAL".to_string(),
            }],
            field_names: vec![InternedString::new(1, "a.b a.b.next")],
            location_names: vec![InternedString::new(
                1,
                "/data/app/com.example-abc==/base.apk",
            )],
        }
    }

    #[test]
    fn test_graph_rows_and_root_distance() {
        let mut ctx = TraceContext::new(ProcessorConfig::default());
        let mut tracker = HeapGraphTracker::new();
        tracker.add_packet(&mut ctx, 1, 1000, &graph());

        let storage = &ctx.storage;
        assert_eq!(storage.heap_graph_classes.len(), 2);
        assert_eq!(storage.heap_graph_objects.len(), 4);
        assert_eq!(storage.heap_graph_references.len(), 3);

        let distances: Vec<_> = storage
            .heap_graph_objects
            .iter()
            .map(|(_, o)| o.root_distance)
            .collect();
        assert_eq!(distances, vec![Some(0), Some(1), Some(2), None]);

        let root = storage.heap_graph_objects.iter().next().unwrap().1;
        assert_eq!(root.root_type.map(|t| storage.get_string(t)), Some("ROOT_JNI_GLOBAL"));
        assert_eq!(root.graph_sample_ts, 1000);

        let null_ref = storage
            .heap_graph_references
            .iter()
            .filter(|(_, r)| r.owned_id.is_none())
            .count();
        assert_eq!(null_ref, 1);
    }

    #[test]
    fn test_class_and_field_indices() {
        let mut ctx = TraceContext::new(ProcessorConfig::default());
        let mut tracker = HeapGraphTracker::new();
        tracker.add_packet(&mut ctx, 1, 1000, &graph());

        let name = ctx.storage.strings.lookup("a.b").unwrap();
        let package = ctx.storage.strings.lookup("com.example");
        assert!(package.is_some());
        assert_eq!(tracker.rows_for_type(package, name).len(), 1);
        // The array type has no location.
        assert_eq!(tracker.rows_for_type(None, name).len(), 1);

        let field = ctx.storage.strings.lookup("a.b.next").unwrap();
        assert_eq!(tracker.rows_for_field(field).len(), 3);
        let reference = &ctx.storage.heap_graph_references[tracker.rows_for_field(field)[0]];
        assert_eq!(ctx.storage.get_string(reference.field_type_name), "a.b");
    }

    #[test]
    fn test_chunks_and_missing_packets() {
        let mut ctx = TraceContext::new(ProcessorConfig::default());
        let mut tracker = HeapGraphTracker::new();

        let mut first = graph();
        first.continued = true;
        first.objects.clear();
        tracker.add_packet(&mut ctx, 1, 1000, &first);
        assert!(ctx.storage.heap_graph_classes.is_empty());

        let mut last = graph();
        last.index = 2;
        last.types.clear();
        tracker.add_packet(&mut ctx, 1, 1000, &last);

        let upid = ctx.storage.heap_graph_objects.iter().next().unwrap().1.upid;
        assert_eq!(
            ctx.storage
                .stats
                .get_indexed(Stat::HeapGraphMissingPacket, upid.0 as i64),
            1
        );
        assert_eq!(ctx.storage.heap_graph_objects.len(), 4);
    }

    #[test]
    fn test_unfinished_graph_counted() {
        let mut ctx = TraceContext::new(ProcessorConfig::default());
        let mut tracker = HeapGraphTracker::new();
        let mut chunk = graph();
        chunk.continued = true;
        tracker.add_packet(&mut ctx, 1, 1000, &chunk);
        tracker.notify_end_of_file(&mut ctx);
        assert_eq!(ctx.storage.stats.get(Stat::HeapGraphNonFinalizedGraph), 1);
        assert!(ctx.storage.heap_graph_objects.is_empty());
    }

    #[test]
    fn test_index_wraparound_is_missing_packet() {
        let mut ctx = TraceContext::new(ProcessorConfig::default());
        let mut tracker = HeapGraphTracker::new();

        let mut chunk = HeapGraph {
            pid: 7,
            index: u64::MAX,
            continued: true,
            ..HeapGraph::default()
        };
        tracker.add_packet(&mut ctx, 1, 1000, &chunk);
        chunk.index = 0;
        tracker.add_packet(&mut ctx, 1, 1000, &chunk);

        assert_eq!(ctx.storage.stats.total(Stat::HeapGraphMissingPacket), 2);
    }
}
