//! Section-name canonicalization and kernel-name extraction.
//!
//! NCU reports the same logical section under several identifiers (the
//! display title for metric rows, the section id for rule rows, chart
//! variants...). They are folded onto one user-facing name here.

/// Raw NCU section name -> canonical name.
///
/// Order matters: canonical names appear in canonical output order in the
/// order they first appear here, and all raw names of one canonical name
/// are grouped together.
pub const SECTION_MAPPINGS: &[(&str, &str)] = &[
    ("GPU Speed Of Light Throughput", "Speed Of Light"),
    ("SpeedOfLight", "Speed Of Light"),
    ("SpeedOfLight_RooflineChart", "Speed Of Light"),
    ("Memory Workload Analysis", "Memory Workload"),
    ("MemoryWorkloadAnalysis", "Memory Workload"),
    ("MemoryWorkloadAnalysis_Chart", "Memory Workload"),
    ("MemoryWorkloadAnalysis_Tables", "Memory Workload"),
    ("Compute Workload Analysis", "Compute Workload"),
    ("ComputeWorkloadAnalysis", "Compute Workload"),
    ("GPU and Memory Workload Distribution", "Compute & Memory Distribution"),
    ("Scheduler Statistics", "Scheduler"),
    ("SchedulerStats", "Scheduler"),
    ("Warp State Statistics", "Warp State"),
    ("WarpStateStats", "Warp State"),
    ("Instruction Statistics", "Instruction"),
    ("Launch Statistics", "Launch"),
    ("PM Sampling", "PM Sampling"),
    ("Occupancy", "Occupancy"),
    ("Source Counters", "Source Counters"),
    ("SourceCounters", "Source Counters"),
];

/// Map a raw section name to its canonical name; unknown names pass through trimmed.
pub fn canonical_section_name(raw: &str) -> &str {
    let raw = raw.trim();
    SECTION_MAPPINGS
        .iter()
        .find(|(from, _)| *from == raw)
        .map(|(_, to)| *to)
        .unwrap_or(raw)
}

/// Position of a canonical section in canonical output order, if it is well known.
pub fn canonical_rank(name: &str) -> Option<usize> {
    let mut rank = 0;
    let mut previous: Option<&str> = None;
    for (_, canonical) in SECTION_MAPPINGS {
        if previous.is_some_and(|p| p != *canonical) {
            rank += 1;
        }
        if *canonical == name {
            return Some(rank);
        }
        previous = Some(canonical);
    }
    None
}

/// Extract the base kernel name from a full (possibly templated) signature.
///
/// Everything before the first `[` or `(`, trimmed. Falls back to the
/// trimmed full name when nothing precedes the delimiter.
pub fn extract_kernel_name(full_name: &str) -> String {
    let base = full_name
        .split(|c| c == '[' || c == '(')
        .next()
        .unwrap_or("")
        .trim();

    if base.is_empty() {
        full_name.trim().to_string()
    } else {
        base.to_string()
    }
}
