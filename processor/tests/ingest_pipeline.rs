use anyhow::Result;
use std::io::Write;
use tempfile::NamedTempFile;
use tracery_processor::{PacketReader, ProcessorConfig, Stat, TraceProcessor};

const HEAP_DUMPS: &str = r#"
# Three dumps of one callstack, cumulative counters
{"sequence_id": 1, "timestamp": 10, "data": {"type": "profile_packet", "index": 0,
 "strings": [{"iid": 1, "str": "lib"}, {"iid": 2, "str": "libc.so"}, {"iid": 3, "str": "malloc"}],
 "mappings": [{"iid": 1, "name_ids": [1, 2], "start": 4096, "end": 8192}],
 "frames": [{"iid": 1, "function_name_id": 3, "mapping_id": 1, "rel_pc": 16}],
 "callstacks": [{"iid": 1, "frame_ids": [1]}],
 "process_dumps": [{"pid": 10, "timestamp": 10,
   "samples": [{"callstack_id": 1, "self_allocated": 100, "alloc_count": 5}]}]}}
{"sequence_id": 1, "timestamp": 20, "data": {"type": "profile_packet", "index": 1,
 "strings": [{"iid": 1, "str": "lib"}, {"iid": 2, "str": "libc.so"}, {"iid": 3, "str": "malloc"}],
 "mappings": [{"iid": 1, "name_ids": [1, 2], "start": 4096, "end": 8192}],
 "frames": [{"iid": 1, "function_name_id": 3, "mapping_id": 1, "rel_pc": 16}],
 "callstacks": [{"iid": 1, "frame_ids": [1]}],
 "process_dumps": [{"pid": 10, "timestamp": 20,
   "samples": [{"callstack_id": 1, "self_allocated": 160, "alloc_count": 8}]}]}}
{"sequence_id": 1, "timestamp": 30, "data": {"type": "profile_packet", "index": 2,
 "strings": [{"iid": 1, "str": "lib"}, {"iid": 2, "str": "libc.so"}, {"iid": 3, "str": "malloc"}],
 "mappings": [{"iid": 1, "name_ids": [1, 2], "start": 4096, "end": 8192}],
 "frames": [{"iid": 1, "function_name_id": 3, "mapping_id": 1, "rel_pc": 16}],
 "callstacks": [{"iid": 1, "frame_ids": [1]}],
 "process_dumps": [{"pid": 10, "timestamp": 30,
   "samples": [{"callstack_id": 1, "self_allocated": 160, "alloc_count": 8}]}]}}
"#;

const JAVA_PROFILE: &str = r#"
{"sequence_id": 2, "timestamp": 5, "data": {"type": "profile_packet", "index": 0,
 "strings": [{"iid": 1, "str": "data"}, {"iid": 2, "str": "app"}, {"iid": 3, "str": "~~X=="},
             {"iid": 4, "str": "com.perfetto.test-Y=="}, {"iid": 5, "str": "base.apk"},
             {"iid": 6, "str": "com.Foo.bar"}],
 "mappings": [{"iid": 1, "name_ids": [1, 2, 3, 4, 5], "end": 4096}],
 "frames": [{"iid": 1, "function_name_id": 6, "mapping_id": 1, "rel_pc": 32}],
 "callstacks": [{"iid": 1, "frame_ids": [1]}],
 "process_dumps": [{"pid": 20, "timestamp": 5,
   "samples": [{"callstack_id": 1, "self_allocated": 64, "alloc_count": 1}]}]}}
{"sequence_id": 3, "data": {"type": "deobfuscation_mapping", "package_name": "com.perfetto.test",
 "obfuscated_classes": [{"obfuscated_name": "Foo", "deobfuscated_name": "RealFoo",
   "obfuscated_members": [{"obfuscated_name": "bar", "deobfuscated_name": "realBar"}]}]}}
"#;

fn write_trace(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn process(contents: &str, config: ProcessorConfig) -> Result<TraceProcessor> {
    let file = write_trace(contents)?;
    let mut processor = TraceProcessor::new(config);
    for packet in PacketReader::open(file.path())? {
        processor.parse_packet(&packet?);
    }
    processor.notify_end_of_file();
    Ok(processor)
}

#[test]
fn test_heap_dumps_become_deltas() -> Result<()> {
    let processor = process(HEAP_DUMPS, ProcessorConfig::default())?;
    let storage = processor.storage();

    let rows: Vec<_> = storage
        .heap_profile_allocations
        .iter()
        .map(|r| (r.ts, r.count, r.size))
        .collect();
    assert_eq!(rows, vec![(10, 5, 100), (20, 3, 60)]);

    // Identical content across dumps shares one row per table.
    assert_eq!(storage.mappings.len(), 1);
    assert_eq!(storage.frames.len(), 1);
    assert_eq!(storage.callsites.len(), 1);
    assert_eq!(storage.get_string(storage.mappings.rows()[0].name), "/lib/libc.so");
    assert_eq!(storage.stats.get(Stat::HeapProfdMissingPacket), 0);
    assert_eq!(storage.stats.get(Stat::HeapProfdNonFinalizedProfile), 0);
    Ok(())
}

#[test]
fn test_java_frame_deobfuscated_at_end_of_file() -> Result<()> {
    let processor = process(JAVA_PROFILE, ProcessorConfig::default())?;
    let storage = processor.storage();

    let frame = &storage.frames.rows()[0];
    assert_eq!(storage.get_string(frame.name), "com.Foo.bar");
    let deobfuscated = frame.deobfuscated_name.map(|id| storage.get_string(id));
    assert_eq!(deobfuscated, Some("RealFoo.realBar"));
    Ok(())
}

#[test]
fn test_deobfuscation_disabled_by_config() -> Result<()> {
    let mut config_file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(config_file, "deobfuscate = false")?;
    writeln!(config_file, "default_heap_name = \"libc.malloc\"")?;
    let config = ProcessorConfig::load(Some(config_file.path()))?;
    assert_eq!(config.default_heap_name, "libc.malloc");

    let processor = process(JAVA_PROFILE, config)?;
    let storage = processor.storage();
    assert!(storage.frames.rows()[0].deobfuscated_name.is_none());

    let heap = storage.heap_profile_allocations[0].heap_name;
    assert_eq!(storage.get_string(heap), "libc.malloc");
    Ok(())
}

#[test]
fn test_summary_counts_rows() -> Result<()> {
    let processor = process(HEAP_DUMPS, ProcessorConfig::default())?;
    let summary = processor.summary();
    assert_eq!(summary.tables["heap_profile_allocation"], 2);
    assert!(summary.stats.is_empty());
    assert_eq!(processor.packets_parsed(), 3);
    Ok(())
}
