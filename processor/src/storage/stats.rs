//! Import diagnostics
//!
//! Every skipped or suspicious record bumps one of these counters. They
//! never influence control flow; they exist so a fully imported trace still
//! shows how much of it was dropped.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    DataLoss,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Single,
    Indexed,
}

macro_rules! define_stats {
    ($($variant:ident => ($name:literal, $kind:ident, $severity:ident),)*) => {
        /// Known diagnostic counters
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Stat {
            $($variant,)*
        }

        impl Stat {
            pub const ALL: &'static [Stat] = &[$(Stat::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Stat::$variant => $name,)*
                }
            }

            pub fn kind(self) -> StatKind {
                match self {
                    $(Stat::$variant => StatKind::$kind,)*
                }
            }

            pub fn severity(self) -> Severity {
                match self {
                    $(Stat::$variant => Severity::$severity,)*
                }
            }
        }
    };
}

define_stats! {
    AndroidLogNumFailed => ("android_log_num_failed", Single, Error),
    AndroidLogNumSkipped => ("android_log_num_skipped", Single, Info),
    AndroidLogNumTotal => ("android_log_num_total", Single, Info),
    StackProfileInvalidStringId => ("stackprofile_invalid_string_id", Single, Error),
    StackProfileInvalidMappingId => ("stackprofile_invalid_mapping_id", Single, Error),
    StackProfileInvalidFrameId => ("stackprofile_invalid_frame_id", Single, Error),
    StackProfileInvalidCallstackId => ("stackprofile_invalid_callstack_id", Single, Error),
    StackProfileEmptyCallstack => ("stackprofile_empty_callstack", Single, Error),
    StackProfileParserError => ("stackprofile_parser_error", Single, Error),
    PerfSamplesSkipped => ("perf_samples_skipped", Single, Info),
    MmapInvalidRange => ("mmap_invalid_range", Single, Error),
    HeapProfdMalformedPacket => ("heapprofd_malformed_packet", Indexed, Error),
    HeapProfdMissingPacket => ("heapprofd_missing_packet", Single, Error),
    HeapProfdNonFinalizedProfile => ("heapprofd_non_finalized_profile", Single, Error),
    HeapGraphInvalidStringId => ("heap_graph_invalid_string_id", Indexed, Error),
    HeapGraphNonFinalizedGraph => ("heap_graph_non_finalized_graph", Single, Error),
    HeapGraphMalformedPacket => ("heap_graph_malformed_packet", Indexed, Error),
    HeapGraphMissingPacket => ("heap_graph_missing_packet", Indexed, DataLoss),
    HeapGraphLocationParseError => ("heap_graph_location_parse_error", Single, Error),
    SymbolizationTmpBuildIdNotFound => ("symbolization_tmp_build_id_not_found", Single, Error),
}

/// A non-zero counter value, as reported to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatEntry {
    pub name: &'static str,
    pub index: Option<i64>,
    pub severity: Severity,
    pub value: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    single: BTreeMap<Stat, i64>,
    indexed: BTreeMap<Stat, BTreeMap<i64, i64>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, stat: Stat) {
        self.increment_by(stat, 1);
    }

    pub fn increment_by(&mut self, stat: Stat, value: i64) {
        debug_assert_eq!(stat.kind(), StatKind::Single, "{} is indexed", stat.name());
        *self.single.entry(stat).or_insert(0) += value;
        record_metric(stat, value);
    }

    pub fn increment_indexed(&mut self, stat: Stat, index: i64) {
        debug_assert_eq!(stat.kind(), StatKind::Indexed, "{} is not indexed", stat.name());
        *self
            .indexed
            .entry(stat)
            .or_default()
            .entry(index)
            .or_insert(0) += 1;
        record_metric(stat, 1);
    }

    pub fn set_indexed(&mut self, stat: Stat, index: i64, value: i64) {
        self.indexed.entry(stat).or_default().insert(index, value);
    }

    pub fn get(&self, stat: Stat) -> i64 {
        self.single.get(&stat).copied().unwrap_or(0)
    }

    pub fn get_indexed(&self, stat: Stat, index: i64) -> i64 {
        self.indexed
            .get(&stat)
            .and_then(|m| m.get(&index))
            .copied()
            .unwrap_or(0)
    }

    /// Sum over all indices of an indexed stat
    pub fn total(&self, stat: Stat) -> i64 {
        match stat.kind() {
            StatKind::Single => self.get(stat),
            StatKind::Indexed => self
                .indexed
                .get(&stat)
                .map_or(0, |m| m.values().sum()),
        }
    }

    /// All non-zero counters in declaration order
    pub fn entries(&self) -> Vec<StatEntry> {
        let mut out = Vec::new();
        for &stat in Stat::ALL {
            match stat.kind() {
                StatKind::Single => {
                    let value = self.get(stat);
                    if value != 0 {
                        out.push(StatEntry {
                            name: stat.name(),
                            index: None,
                            severity: stat.severity(),
                            value,
                        });
                    }
                }
                StatKind::Indexed => {
                    for (&index, &value) in self.indexed.get(&stat).into_iter().flatten() {
                        if value != 0 {
                            out.push(StatEntry {
                                name: stat.name(),
                                index: Some(index),
                                severity: stat.severity(),
                                value,
                            });
                        }
                    }
                }
            }
        }
        out
    }
}

fn record_metric(stat: Stat, value: i64) {
    if value > 0 {
        crate::metrics::STATS_TOTAL
            .with_label_values(&[stat.name()])
            .inc_by(value as f64);
    }
}
