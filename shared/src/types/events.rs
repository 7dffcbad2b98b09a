//! Decoded trace packets
//!
//! These types are the already-decoded form of the packets a producer writes
//! into a trace. Each packet belongs to a packet sequence whose interning ids
//! are only meaningful inside that sequence.

use super::ids::{InternId, SequenceId, SourceCallstackId, SourceFrameId, SourceMappingId, SourceStringId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Timestamp in nanoseconds
pub type Timestamp = i64;

/// Process ID
pub type Pid = i32;

/// Thread ID
pub type Tid = i32;

/// Android user id of an app or system process
pub type Uid = i64;

/// Raw string bytes as written by the producer.
///
/// Serialized as a JSON string when the bytes are UTF-8 and as an array of
/// bytes otherwise (binary build ids).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RawString(pub Vec<u8>);

impl RawString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for RawString {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for RawString {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<Vec<u8>> for RawString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for RawString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(s) => serializer.serialize_str(s),
            Err(_) => self.0.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RawString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Bytes(Vec<u8>),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(s) => RawString(s.into_bytes()),
            Repr::Bytes(b) => RawString(b),
        })
    }
}

/// A string entry of an intern table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternedString {
    pub iid: SourceStringId,
    #[serde(rename = "str")]
    pub value: RawString,
}

impl InternedString {
    pub fn new(iid: SourceStringId, value: impl Into<RawString>) -> Self {
        Self {
            iid,
            value: value.into(),
        }
    }
}

/// A memory mapping as written by the producer, referencing its own strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceMapping {
    /// Interned build id string
    #[serde(default)]
    pub build_id: SourceStringId,

    #[serde(default)]
    pub exact_offset: u64,

    #[serde(default)]
    pub start_offset: u64,

    #[serde(default)]
    pub start: u64,

    #[serde(default)]
    pub end: u64,

    #[serde(default)]
    pub load_bias: u64,

    /// Interned path components, joined with `/`
    #[serde(default)]
    pub name_ids: Vec<SourceStringId>,
}

/// A code location as written by the producer
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFrame {
    /// Interned function name, 0 when unknown
    #[serde(default)]
    pub function_name_id: SourceStringId,

    pub mapping_id: SourceMappingId,

    #[serde(default)]
    pub rel_pc: u64,
}

/// Frame ids ordered from the outermost caller to the leaf
pub type SourceCallstack = Vec<SourceFrameId>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternedMapping {
    pub iid: SourceMappingId,
    #[serde(flatten)]
    pub mapping: SourceMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternedFrame {
    pub iid: SourceFrameId,
    #[serde(flatten)]
    pub frame: SourceFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternedCallstack {
    pub iid: SourceCallstackId,
    pub frame_ids: SourceCallstack,
}

/// Incremental interning data shared by later packets of a sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InternedData {
    pub build_ids: Vec<InternedString>,
    pub mapping_paths: Vec<InternedString>,
    pub function_names: Vec<InternedString>,
    pub mappings: Vec<InternedMapping>,
    pub frames: Vec<InternedFrame>,
    pub callstacks: Vec<InternedCallstack>,
}

/// Defaults applied to every later packet of a sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracePacketDefaults {
    pub timestamp_clock_id: Option<u32>,

    /// Process and thread the sequence's samples belong to
    pub pid: Option<Pid>,
    pub tid: Option<Tid>,
}

/// One cumulative allocation counter set for a callstack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapSample {
    pub callstack_id: SourceCallstackId,

    /// Bytes allocated since profiling started
    pub self_allocated: u64,

    /// Bytes freed since profiling started
    pub self_freed: u64,

    pub alloc_count: u64,
    pub free_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessHeapSamples {
    pub pid: Pid,

    /// Dump timestamp
    pub timestamp: Timestamp,

    /// Heap the samples belong to, `malloc` when absent
    pub heap_name: Option<String>,

    pub samples: Vec<HeapSample>,
}

/// A heap profile dump, or one chunk of it when `continued` is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePacket {
    pub index: u64,
    pub continued: bool,
    pub strings: Vec<InternedString>,
    pub mappings: Vec<InternedMapping>,
    pub frames: Vec<InternedFrame>,
    pub callstacks: Vec<InternedCallstack>,
    pub process_dumps: Vec<ProcessHeapSamples>,
}

/// CPU samples of the sequence's thread, as callstack ids plus time deltas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingProfilePacket {
    pub callstack_iid: Vec<SourceCallstackId>,
    pub timestamp_delta_us: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfSample {
    pub cpu: u32,
    pub pid: Pid,
    pub tid: Tid,
    pub callstack_iid: Option<SourceCallstackId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolLine {
    pub function_name: String,
    pub source_file_name: String,
    pub line_number: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressSymbols {
    /// Address relative to the mapping
    pub address: u64,

    /// Inlined frames, outermost last
    pub lines: Vec<SymbolLine>,
}

/// Offline symbolization results for one binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSymbols {
    pub path: String,
    pub build_id: RawString,
    pub address_symbols: Vec<AddressSymbols>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscatedMember {
    pub obfuscated_name: String,
    pub deobfuscated_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscatedClass {
    pub obfuscated_name: String,
    pub deobfuscated_name: String,
    pub obfuscated_members: Vec<ObfuscatedMember>,
}

/// ProGuard/R8 mapping for one app package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeobfuscationMapping {
    pub package_name: String,
    pub version_code: i64,
    pub obfuscated_classes: Vec<ObfuscatedClass>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapGraphType {
    pub id: InternId,
    pub class_name: String,
    pub location_id: Option<InternId>,
    pub object_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapGraphObject {
    pub id: u64,
    pub type_id: InternId,
    pub self_size: u64,

    /// Parallel to `reference_object_id`
    pub reference_field_id: Vec<InternId>,
    pub reference_object_id: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapGraphRoot {
    pub object_ids: Vec<u64>,
    pub root_type: String,
}

/// Java heap dump chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapGraph {
    pub pid: Pid,
    pub index: u64,
    pub continued: bool,
    pub types: Vec<HeapGraphType>,
    pub objects: Vec<HeapGraphObject>,
    pub roots: Vec<HeapGraphRoot>,

    /// `"type name"` strings, e.g. `"java.lang.Object sun.misc.Cleaner.next"`
    pub field_names: Vec<InternedString>,
    pub location_names: Vec<InternedString>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub ppid: Pid,
    pub uid: Option<Uid>,
    pub cmdline: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadEntry {
    pub tid: Tid,
    pub tgid: Pid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessTree {
    pub processes: Vec<ProcessEntry>,
    pub threads: Vec<ThreadEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageInfo {
    pub name: String,
    pub uid: Uid,
    pub debuggable: bool,
    pub profileable_from_shell: bool,
    pub version_code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesList {
    pub packages: Vec<PackageInfo>,
}

/// A new mapping in a process address space (perf mmap record)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmapEvent {
    pub pid: Pid,
    pub start: u64,
    pub len: u64,
    pub pgoff: u64,
    pub filename: String,
    pub build_id: RawString,
}

/// Android log priority, numbered as in `android/log.h`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AndroidLogPriority {
    #[default]
    Unspecified = 0,
    Unused = 1,
    Verbose = 2,
    Debug = 3,
    Info = 4,
    Warn = 5,
    Error = 6,
    Fatal = 7,
}

impl AndroidLogPriority {
    /// Priority for the single-letter logcat column
    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'V' => Some(Self::Verbose),
            'D' => Some(Self::Debug),
            'I' => Some(Self::Info),
            'W' => Some(Self::Warn),
            'E' => Some(Self::Error),
            'F' => Some(Self::Fatal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidLogEvent {
    pub timestamp: Timestamp,
    pub pid: Pid,
    pub tid: Tid,
    pub prio: AndroidLogPriority,
    pub tag: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidLogPacket {
    pub events: Vec<AndroidLogEvent>,
}

/// Packet payloads understood by the processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PacketData {
    ProfilePacket(ProfilePacket),
    StreamingProfilePacket(StreamingProfilePacket),
    PerfSample(PerfSample),
    ModuleSymbols(ModuleSymbols),
    DeobfuscationMapping(DeobfuscationMapping),
    HeapGraph(HeapGraph),
    ProcessTree(ProcessTree),
    PackagesList(PackagesList),
    Mmap(MmapEvent),
    AndroidLog(AndroidLogPacket),
}

impl PacketData {
    /// Short name of the payload kind, used for logging and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            PacketData::ProfilePacket(_) => "profile_packet",
            PacketData::StreamingProfilePacket(_) => "streaming_profile_packet",
            PacketData::PerfSample(_) => "perf_sample",
            PacketData::ModuleSymbols(_) => "module_symbols",
            PacketData::DeobfuscationMapping(_) => "deobfuscation_mapping",
            PacketData::HeapGraph(_) => "heap_graph",
            PacketData::ProcessTree(_) => "process_tree",
            PacketData::PackagesList(_) => "packages_list",
            PacketData::Mmap(_) => "mmap",
            PacketData::AndroidLog(_) => "android_log",
        }
    }
}

/// A decoded trace packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePacket {
    /// Producer-assigned sequence the packet belongs to
    #[serde(default)]
    pub sequence_id: SequenceId,

    #[serde(default)]
    pub timestamp: Timestamp,

    /// Drops all interning state of the sequence before this packet
    #[serde(default)]
    pub incremental_state_cleared: bool,

    /// New defaults for this and later packets of the sequence
    #[serde(default)]
    pub defaults: Option<TracePacketDefaults>,

    #[serde(default)]
    pub interned_data: Option<InternedData>,

    #[serde(default)]
    pub data: Option<PacketData>,
}

impl TracePacket {
    pub fn new(sequence_id: SequenceId, timestamp: Timestamp, data: PacketData) -> Self {
        Self {
            sequence_id,
            timestamp,
            incremental_state_cleared: false,
            defaults: None,
            interned_data: None,
            data: Some(data),
        }
    }

    /// Get the timestamp of the packet
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Payload kind, or `interned_data` for packets that only carry interning state
    pub fn kind(&self) -> &'static str {
        self.data.as_ref().map_or("interned_data", PacketData::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_from_json() {
        let json = r#"{
            "sequence_id": 3,
            "timestamp": 100,
            "data": {
                "type": "profile_packet",
                "index": 0,
                "strings": [{"iid": 1, "str": "libc.so"}],
                "mappings": [{"iid": 1, "name_ids": [1], "start": 4096, "end": 8192}],
                "frames": [{"iid": 1, "mapping_id": 1, "rel_pc": 16}],
                "callstacks": [{"iid": 1, "frame_ids": [1]}],
                "process_dumps": [{"pid": 10, "timestamp": 100,
                    "samples": [{"callstack_id": 1, "self_allocated": 64, "alloc_count": 1}]}]
            }
        }"#;

        let packet: TracePacket = serde_json::from_str(json).unwrap();
        assert_eq!(packet.sequence_id, 3);
        assert_eq!(packet.kind(), "profile_packet");
        let Some(PacketData::ProfilePacket(profile)) = packet.data else {
            panic!("Wrong variant");
        };
        assert_eq!(profile.strings[0].value.as_bytes(), b"libc.so");
        assert_eq!(profile.mappings[0].mapping.end, 8192);
        assert_eq!(profile.frames[0].frame.rel_pc, 16);
        assert_eq!(profile.process_dumps[0].samples[0].self_allocated, 64);
        assert!(!profile.continued);
    }

    #[test]
    fn test_raw_string_keeps_binary_bytes() {
        let binary = RawString(vec![0xff, 0x00, 0x10]);
        let json = serde_json::to_string(&binary).unwrap();
        assert_eq!(json, "[255,0,16]");
        let back: RawString = serde_json::from_str(&json).unwrap();
        assert_eq!(back, binary);

        let text: RawString = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(text.as_bytes(), b"abc");
    }

    #[test]
    fn test_interned_data_only_packet() {
        let packet: TracePacket = serde_json::from_str(
            r#"{"sequence_id": 1, "interned_data": {"function_names": [{"iid": 2, "str": "main"}]}}"#,
        )
        .unwrap();
        assert_eq!(packet.kind(), "interned_data");
        assert_eq!(packet.interned_data.unwrap().function_names.len(), 1);
    }

    #[test]
    fn test_priority_letters() {
        assert_eq!(AndroidLogPriority::from_letter('D'), Some(AndroidLogPriority::Debug));
        assert_eq!(AndroidLogPriority::from_letter('F').map(|p| p as u8), Some(7));
        assert_eq!(AndroidLogPriority::from_letter('X'), None);
    }
}
