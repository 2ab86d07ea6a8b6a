//! Trace model produced from an Nsight Systems export.
//!
//! Timestamps and durations are kept in the source's native unit
//! (nanoseconds); the only unit conversion happens in the JSON renderer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Trace event phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "i")]
    Instant,
    #[serde(rename = "B")]
    Begin,
    #[serde(rename = "E")]
    End,
    #[serde(rename = "X")]
    Complete,
    #[serde(rename = "M")]
    Metadata,
}

impl Phase {
    /// Single-letter phase code of the trace format
    pub fn code(self) -> &'static str {
        match self {
            Self::Instant => "i",
            Self::Begin => "B",
            Self::End => "E",
            Self::Complete => "X",
            Self::Metadata => "M",
        }
    }
}

/// Scalar argument value (plus string lists for region annotations)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    UInt(u64),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

pub type Args = BTreeMap<String, ArgValue>;

/// A (process, thread) timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Track {
    pub pid: u64,
    pub tid: u64,
}

impl Track {
    pub fn new(pid: u64, tid: u64) -> Self {
        Self { pid, tid }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {} / tid {}", self.pid, self.tid)
    }
}

/// One assembled trace event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Assigned by the assembler in emitted order, starting at 1
    pub id: u64,
    pub name: String,
    pub category: Option<String>,
    pub phase: Phase,
    /// Nanoseconds
    pub ts: u64,
    /// Nanoseconds; complete events only
    pub dur: Option<u64>,
    pub pid: u64,
    pub tid: u64,
    pub args: Args,
    /// Trace viewer reserved color name
    pub color: Option<String>,
}

impl TraceEvent {
    pub fn track(&self) -> Track {
        Track::new(self.pid, self.tid)
    }

    /// End timestamp for complete events, `ts` otherwise
    pub fn end(&self) -> u64 {
        self.ts + self.dur.unwrap_or(0)
    }
}

/// Which kind of reference could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A pid with no `PROCESSES` row
    Process,
    /// A string id with no `StringIds` row
    String,
}

/// A relational reference that was replaced by a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceResolutionWarning {
    pub kind: ReferenceKind,
    pub id: i64,
    /// Placeholder that was substituted
    pub placeholder: String,
    /// Where the reference was first seen
    pub context: String,
}

impl fmt::Display for ReferenceResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ReferenceKind::Process => "process",
            ReferenceKind::String => "string",
        };
        write!(
            f,
            "unresolved {} id {} in {} (using '{}')",
            kind, self.id, self.context, self.placeholder
        )
    }
}

/// Identity of an event taking part in a nesting violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    pub id: u64,
    pub name: String,
    pub ts: u64,
    pub end: u64,
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} '{}' [{}, {})", self.id, self.name, self.ts, self.end)
    }
}

/// Two intervals on one track that partially overlap.
///
/// The `second` event was emitted as a sibling of `first` rather than
/// nested inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestingViolation {
    pub track: Track,
    pub first: EventRef,
    pub second: EventRef,
}

impl fmt::Display for NestingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} partially overlaps {}",
            self.track, self.second, self.first
        )
    }
}

/// Recovered anomalies surfaced alongside a successful conversion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionWarnings {
    pub unresolved_references: Vec<ReferenceResolutionWarning>,
    pub nesting_violations: Vec<NestingViolation>,
}

impl ConversionWarnings {
    pub fn total(&self) -> usize {
        self.unresolved_references.len() + self.nesting_violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Assembled trace, immutable once built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceModel {
    /// Data events in emitted order
    pub events: Vec<TraceEvent>,
    /// pid -> display name
    pub processes: BTreeMap<u64, String>,
    /// (pid, tid) -> display name
    pub threads: BTreeMap<Track, String>,
    pub warnings: ConversionWarnings,
}

impl TraceModel {
    /// Number of events per category
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            let category = event.category.clone().unwrap_or_default();
            *counts.entry(category).or_insert(0) += 1;
        }
        counts
    }
}
