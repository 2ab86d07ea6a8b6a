//! Order normalized events into a trace.
//!
//! Events are grouped by track and sorted by `(start asc, duration desc,
//! input order)`, so an enclosing interval always precedes the intervals
//! it contains. A partial overlap on one track cannot be nested; the later
//! interval is kept as a sibling of the earlier one and a
//! [`NestingViolation`] is recorded. Tracks with violations are always
//! written as complete events, even when begin/end pairs were requested.

use super::normalizer::{EventDescriptor, NormalizedTrace};
use super::schema::{
    ConversionWarnings, EventRef, NestingViolation, Phase, TraceEvent, TraceModel, Track,
};
use crate::utils::config::{IntervalEncoding, NsysConfig};
use log::{debug, warn};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

/// Build the final trace model
///
/// **Public** - last stage of the NSYS pipeline
///
/// Never fails: structural anomalies are reported in the model's warnings.
pub fn assemble(trace: NormalizedTrace, config: &NsysConfig) -> TraceModel {
    let NormalizedTrace {
        events,
        processes,
        threads,
        unresolved,
    } = trace;

    let mut sorted = events;
    // Stable sort keeps input order as the last tie-breaker
    sorted.sort_by_key(|e| (e.track, e.start, Reverse(e.duration())));

    let pending = find_violations(&sorted);
    let violated: BTreeSet<Track> = pending.iter().map(|v| sorted[v.first].track).collect();

    let mut emitter = Emitter::default();
    let mut start = 0;
    while start < sorted.len() {
        let track = sorted[start].track;
        let len = sorted[start..]
            .iter()
            .take_while(|e| e.track == track)
            .count();
        let group = &sorted[start..start + len];

        match config.interval_encoding {
            IntervalEncoding::BeginEnd if !violated.contains(&track) => {
                emitter.begin_end(group, start)
            }
            IntervalEncoding::BeginEnd => {
                warn!(
                    "Track {} has overlapping intervals; writing complete events",
                    track
                );
                emitter.complete(group, start)
            }
            IntervalEncoding::Complete => emitter.complete(group, start),
        }

        start += len;
    }

    let nesting_violations: Vec<NestingViolation> = pending
        .iter()
        .map(|v| NestingViolation {
            track: sorted[v.first].track,
            first: emitter.event_ref(&sorted, v.first),
            second: emitter.event_ref(&sorted, v.second),
        })
        .collect();
    for violation in &nesting_violations {
        warn!("Nesting violation on {}", violation);
    }

    debug!(
        "Assembled {} trace events ({} nesting violations)",
        emitter.events.len(),
        nesting_violations.len()
    );

    TraceModel {
        events: emitter.events,
        processes,
        threads,
        warnings: ConversionWarnings {
            unresolved_references: unresolved,
            nesting_violations,
        },
    }
}

/// Indices into the sorted descriptor list
struct PendingViolation {
    first: usize,
    second: usize,
}

/// Walk each track with a stack of open intervals.
///
/// An interval that starts inside the top of the stack but ends after it
/// is a partial overlap: the top is closed early (the later interval
/// becomes its sibling) and the check continues against the next one down.
fn find_violations(sorted: &[EventDescriptor]) -> Vec<PendingViolation> {
    let mut violations = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut track = None;

    for (index, event) in sorted.iter().enumerate() {
        if track != Some(event.track) {
            stack.clear();
            track = Some(event.track);
        }

        let Some(end) = event.end else {
            // Instants never conflict and never contain anything
            continue;
        };

        while let Some(&top) = stack.last() {
            let top_end = sorted[top].end.unwrap_or(sorted[top].start);
            if top_end <= event.start {
                stack.pop();
            } else if end > top_end {
                violations.push(PendingViolation {
                    first: top,
                    second: index,
                });
                stack.pop();
            } else {
                break;
            }
        }

        stack.push(index);
    }

    violations
}

#[derive(Default)]
struct Emitter {
    events: Vec<TraceEvent>,
    /// Sorted index -> id of its first emitted event
    ids: HashMap<usize, u64>,
}

impl Emitter {
    fn complete(&mut self, group: &[EventDescriptor], offset: usize) {
        for (i, event) in group.iter().enumerate() {
            let (phase, dur) = match event.end {
                Some(_) => (Phase::Complete, Some(event.duration())),
                None => (Phase::Instant, None),
            };
            self.push(offset + i, event, phase, event.start, dur);
        }
    }

    /// Properly nested intervals as begin/end pairs
    fn begin_end(&mut self, group: &[EventDescriptor], offset: usize) {
        let mut open: Vec<&EventDescriptor> = Vec::new();

        for (i, event) in group.iter().enumerate() {
            while let Some(top) = open.last() {
                let top_end = top.end.unwrap_or(top.start);
                if top_end > event.start {
                    break;
                }
                self.push_end(top, top_end);
                open.pop();
            }

            match event.end {
                Some(_) => {
                    self.push(offset + i, event, Phase::Begin, event.start, None);
                    open.push(event);
                }
                None => self.push(offset + i, event, Phase::Instant, event.start, None),
            }
        }

        while let Some(top) = open.pop() {
            self.push_end(top, top.end.unwrap_or(top.start));
        }
    }

    fn push(
        &mut self,
        index: usize,
        event: &EventDescriptor,
        phase: Phase,
        ts: u64,
        dur: Option<u64>,
    ) {
        let id = self.next_id();
        self.ids.insert(index, id);
        self.events.push(TraceEvent {
            id,
            name: event.name.clone(),
            category: Some(event.activity.category().to_string()),
            phase,
            ts,
            dur,
            pid: event.track.pid,
            tid: event.track.tid,
            args: event.args.clone(),
            color: event.color.clone(),
        });
    }

    fn push_end(&mut self, event: &EventDescriptor, ts: u64) {
        let id = self.next_id();
        self.events.push(TraceEvent {
            id,
            name: event.name.clone(),
            category: Some(event.activity.category().to_string()),
            phase: Phase::End,
            ts,
            dur: None,
            pid: event.track.pid,
            tid: event.track.tid,
            args: Default::default(),
            color: event.color.clone(),
        });
    }

    fn next_id(&self) -> u64 {
        self.events.len() as u64 + 1
    }

    fn event_ref(&self, sorted: &[EventDescriptor], index: usize) -> EventRef {
        let event = &sorted[index];
        EventRef {
            id: self.ids.get(&index).copied().unwrap_or_default(),
            name: event.name.clone(),
            ts: event.start,
            end: event.end.unwrap_or(event.start),
        }
    }
}
