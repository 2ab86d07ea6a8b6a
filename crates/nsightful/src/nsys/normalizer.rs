//! Turn raw export rows into uniform event descriptors.
//!
//! Every relational reference (string ids, process ids) is resolved here.
//! A reference with no target is replaced by a placeholder and reported
//! once per distinct id; it never aborts the conversion.

use super::schema::{ArgValue, Args, ReferenceKind, ReferenceResolutionWarning, Track};
use super::tables::{KernelRow, NvtxRow, RawTables, RuntimeRow};
use crate::utils::config::{
    NsysActivity, NsysConfig, DEVICE_PID_BASE, GLOBAL_ID_FIELD_BITS, GLOBAL_ID_FIELD_MASK,
    NVTX_KERNEL_TID, NVTX_MARK_EVENT_TYPE,
};
use crate::utils::error::NsysError;
use log::{debug, warn};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const NVTX_REGIONS_ARG: &str = "NVTXRegions";

/// One normalized event, not yet ordered or assigned an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    pub name: String,
    pub activity: NsysActivity,
    /// Nanoseconds
    pub start: u64,
    /// `None` for instants
    pub end: Option<u64>,
    pub track: Track,
    pub args: Args,
    pub color: Option<String>,
}

impl EventDescriptor {
    pub fn duration(&self) -> u64 {
        self.end.map_or(0, |end| end - self.start)
    }

    pub fn is_instant(&self) -> bool {
        self.end.is_none()
    }
}

/// Normalizer output, consumed by the assembler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedTrace {
    /// Descriptors in input order
    pub events: Vec<EventDescriptor>,
    pub processes: BTreeMap<u64, String>,
    pub threads: BTreeMap<Track, String>,
    pub unresolved: Vec<ReferenceResolutionWarning>,
}

/// pid field of a packed `globalPid`/`globalTid`
pub fn decode_pid(global_id: i64) -> u64 {
    ((global_id as u64) >> GLOBAL_ID_FIELD_BITS) & GLOBAL_ID_FIELD_MASK
}

/// Track of a packed `globalTid`
pub fn decode_track(global_tid: i64) -> Track {
    Track::new(decode_pid(global_tid), (global_tid as u64) & GLOBAL_ID_FIELD_MASK)
}

/// Track of a kernel: one synthetic process per device, one thread per stream
///
/// Negative ids are invalid and map to device or stream 0.
pub fn device_track(device_id: i64, stream_id: i64) -> Track {
    let device = u64::try_from(device_id).unwrap_or_else(|_| {
        warn!("Invalid deviceId {}, using device 0", device_id);
        0
    });
    let stream = u64::try_from(stream_id).unwrap_or_else(|_| {
        warn!("Invalid streamId {}, using stream 0", stream_id);
        0
    });
    Track::new(DEVICE_PID_BASE + device, stream)
}

/// Normalize raw rows for the selected activities
///
/// **Public** - second stage of the NSYS pipeline
///
/// # Errors
/// * `NsysError::UnsupportedSchema` - see [`RawTables::check_schema`]
pub fn normalize(tables: &RawTables, config: &NsysConfig) -> Result<NormalizedTrace, NsysError> {
    tables.check_schema(config)?;

    let mut resolver = Resolver::new(tables);
    resolver.named_threads();

    let kernels = tables.kernels.as_deref().unwrap_or(&[]);
    let runtime = tables.runtime.as_deref().unwrap_or(&[]);
    let nvtx = tables.nvtx.as_deref().unwrap_or(&[]);

    let mut events = Vec::new();

    // Kernel descriptors are built whenever kernels are needed so that
    // NVTX projection can annotate them; only kept if selected.
    let mut kernel_events: Vec<EventDescriptor> =
        if config.wants(NsysActivity::Kernel) || config.wants(NsysActivity::NvtxKernel) {
            kernels
                .iter()
                .map(|row| kernel_event(row, &mut resolver, config))
                .collect()
        } else {
            Vec::new()
        };

    if config.wants(NsysActivity::CudaApi) {
        for row in runtime {
            events.push(runtime_event(row, &mut resolver, config));
        }
    }

    let ranges = if config.wants(NsysActivity::NvtxCpu) || config.wants(NsysActivity::NvtxKernel) {
        nvtx_events(nvtx, &mut resolver, config)
    } else {
        Vec::new()
    };
    if config.wants(NsysActivity::NvtxCpu) {
        for range in &ranges {
            resolver.thread(range.track);
        }
        events.extend(ranges.iter().cloned());
    }

    if config.wants(NsysActivity::NvtxKernel) {
        let mut projected = project_nvtx(&ranges, runtime, kernels, &mut kernel_events);
        let lanes = assign_lanes(&mut projected);
        for (event, lane) in projected.iter().zip(lanes) {
            resolver.nvtx_lane(event.track, lane);
        }
        events.extend(projected);
    }

    if config.wants(NsysActivity::Kernel) {
        for event in &kernel_events {
            resolver.stream(event.track);
        }
        let mut all = kernel_events;
        all.append(&mut events);
        events = all;
    }

    let trace = resolver.finish(events);
    debug!(
        "Normalized {} events on {} tracks ({} unresolved references)",
        trace.events.len(),
        trace.threads.len(),
        trace.unresolved.len()
    );
    Ok(trace)
}

fn kernel_event(row: &KernelRow, resolver: &mut Resolver, config: &NsysConfig) -> EventDescriptor {
    let name = resolver.string(row.short_name, "kernel name");
    let mut args = Args::new();
    args.insert("deviceId".into(), ArgValue::Int(row.device_id));
    args.insert("streamId".into(), ArgValue::Int(row.stream_id));
    args.insert("correlationId".into(), ArgValue::Int(row.correlation_id));
    args.insert("pid".into(), ArgValue::UInt(decode_pid(row.global_pid)));

    let (start, end) = interval(row.start, row.end);
    EventDescriptor {
        color: config.color_for(&name),
        name,
        activity: NsysActivity::Kernel,
        start,
        end: Some(end),
        track: device_track(row.device_id, row.stream_id),
        args,
    }
}

fn runtime_event(
    row: &RuntimeRow,
    resolver: &mut Resolver,
    config: &NsysConfig,
) -> EventDescriptor {
    let name = resolver.string(row.name_id, "runtime call name");
    let track = decode_track(row.global_tid);
    resolver.thread(track);

    let mut args = Args::new();
    args.insert("correlationId".into(), ArgValue::Int(row.correlation_id));

    let (start, end) = interval(row.start, row.end);
    EventDescriptor {
        color: config.color_for(&name),
        name,
        activity: NsysActivity::CudaApi,
        start,
        end: Some(end),
        track,
        args,
    }
}

/// NVTX ranges and marks that pass the prefix filter, in input order
fn nvtx_events(
    rows: &[NvtxRow],
    resolver: &mut Resolver,
    config: &NsysConfig,
) -> Vec<EventDescriptor> {
    let mut events = Vec::new();

    for row in rows {
        let Some(global_tid) = row.global_tid else {
            debug!("Skipping NVTX event at {} without a thread", row.start);
            continue;
        };

        let name = match (&row.text, row.text_id) {
            (Some(text), _) => text.clone(),
            (None, Some(id)) => resolver.string(id, "NVTX text"),
            (None, None) => String::new(),
        };
        if !config.accepts_nvtx(&name) {
            continue;
        }

        let start = clamp(row.start);
        let end = if row.event_type == NVTX_MARK_EVENT_TYPE {
            None
        } else {
            match row.end {
                Some(end) => Some(interval(row.start, end).1),
                None => {
                    debug!("Skipping NVTX range '{}' at {} without an end", name, start);
                    continue;
                }
            }
        };

        let track = decode_track(global_tid);
        events.push(EventDescriptor {
            color: config.color_for(&name),
            name,
            activity: NsysActivity::NvtxCpu,
            start,
            end,
            track,
            args: Args::new(),
        });
    }

    events
}

/// Project NVTX ranges onto the kernels launched inside them.
///
/// A kernel belongs to a range when the runtime call that launched it
/// (matched by process and correlation id) started on the range's thread
/// within the range. Each range yields one event per device, spanning its
/// kernels, and each kernel gets the range name in its region list.
/// Projected events are left on lane 0; see [`assign_lanes`].
fn project_nvtx(
    ranges: &[EventDescriptor],
    runtime: &[RuntimeRow],
    kernels: &[KernelRow],
    kernel_events: &mut [EventDescriptor],
) -> Vec<EventDescriptor> {
    let mut launches: HashMap<(u64, i64), Vec<usize>> = HashMap::new();
    for (index, row) in kernels.iter().enumerate() {
        launches
            .entry((decode_pid(row.global_pid), row.correlation_id))
            .or_default()
            .push(index);
    }

    // Runtime calls per thread, sorted by start
    let mut calls: HashMap<Track, Vec<&RuntimeRow>> = HashMap::new();
    for row in runtime {
        calls.entry(decode_track(row.global_tid)).or_default().push(row);
    }
    for list in calls.values_mut() {
        list.sort_by_key(|row| row.start);
    }

    let mut projected = Vec::new();
    for range in ranges {
        let Some(end) = range.end else { continue };
        let Some(thread_calls) = calls.get(&range.track) else {
            continue;
        };

        let first = thread_calls.partition_point(|row| clamp(row.start) < range.start);
        let mut per_device: BTreeMap<u64, (u64, u64)> = BTreeMap::new();

        for call in thread_calls[first..]
            .iter()
            .take_while(|row| clamp(row.start) < end)
        {
            let key = (range.track.pid, call.correlation_id);
            for &index in launches.get(&key).map(Vec::as_slice).unwrap_or(&[]) {
                let kernel = &mut kernel_events[index];
                let span = per_device
                    .entry(kernel.track.pid)
                    .or_insert((u64::MAX, 0));
                span.0 = span.0.min(kernel.start);
                span.1 = span.1.max(kernel.end.unwrap_or(kernel.start));
                add_region(&mut kernel.args, &range.name);
            }
        }

        for (device_pid, (start, end)) in per_device {
            projected.push(EventDescriptor {
                name: range.name.clone(),
                activity: NsysActivity::NvtxKernel,
                start,
                end: Some(end),
                track: Track::new(device_pid, NVTX_KERNEL_TID),
                args: Args::new(),
                color: range.color.clone(),
            });
        }
    }

    projected
}

/// Spread projected ranges over as many lanes per device as needed.
///
/// Kernels run asynchronously, so ranges that are sequential on the host
/// can overlap on the device. Each range goes to the first lane of its
/// device where it nests inside or follows the open ranges; lane `n` is
/// `tid = NVTX_KERNEL_TID - n`. Returns the lane of each event.
fn assign_lanes(projected: &mut [EventDescriptor]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..projected.len()).collect();
    order.sort_by_key(|&i| {
        let event = &projected[i];
        (event.track.pid, event.start, Reverse(event.duration()))
    });

    // Device pid -> per lane, ends of the ranges still open
    let mut devices: HashMap<u64, Vec<Vec<u64>>> = HashMap::new();
    let mut assigned = vec![0; projected.len()];

    for index in order {
        let event = &mut projected[index];
        let start = event.start;
        let end = event.end.unwrap_or(start);
        let lanes = devices.entry(event.track.pid).or_default();

        let free = lanes.iter_mut().position(|open| {
            while open.last().is_some_and(|&top| top <= start) {
                open.pop();
            }
            open.last().map_or(true, |&top| end <= top)
        });
        let lane = free.unwrap_or_else(|| {
            lanes.push(Vec::new());
            lanes.len() - 1
        });

        lanes[lane].push(end);
        event.track.tid = NVTX_KERNEL_TID - lane as u64;
        assigned[index] = lane;
    }

    assigned
}

fn add_region(args: &mut Args, name: &str) {
    let entry = args
        .entry(NVTX_REGIONS_ARG.to_string())
        .or_insert_with(|| ArgValue::List(Vec::new()));
    if let ArgValue::List(regions) = entry {
        regions.push(name.to_string());
    }
}

fn clamp(ts: i64) -> u64 {
    ts.max(0) as u64
}

/// Start and end in nanoseconds; an end before the start collapses to the start
fn interval(start: i64, end: i64) -> (u64, u64) {
    let start = clamp(start);
    let end = clamp(end);
    if end < start {
        debug!("End {} precedes start {}, using zero duration", end, start);
        (start, start)
    } else {
        (start, end)
    }
}

/// Reference resolution state
struct Resolver {
    strings: HashMap<i64, String>,
    processes: BTreeMap<u64, String>,
    threads: BTreeMap<Track, String>,
    thread_name_ids: BTreeMap<Track, i64>,
    unresolved: Vec<ReferenceResolutionWarning>,
    reported: HashSet<(ReferenceKind, i64)>,
}

impl Resolver {
    fn new(tables: &RawTables) -> Self {
        let strings = tables
            .strings
            .iter()
            .flatten()
            .map(|row| (row.id, row.value.clone()))
            .collect();

        let mut processes = BTreeMap::new();
        for row in tables.processes.iter().flatten() {
            let pid = decode_pid(row.global_pid);
            let name = match row.name.as_deref() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => format!("Process {}", row.pid),
            };
            processes.insert(pid, name);
        }

        let thread_name_ids = tables
            .thread_names
            .iter()
            .flatten()
            .map(|row| (decode_track(row.global_tid), row.name_id))
            .collect();

        Self {
            strings,
            processes,
            threads: BTreeMap::new(),
            thread_name_ids,
            unresolved: Vec::new(),
            reported: HashSet::new(),
        }
    }

    /// Resolve a string id, falling back to its decimal text
    fn string(&mut self, id: i64, context: &str) -> String {
        if let Some(value) = self.strings.get(&id) {
            return value.clone();
        }
        let placeholder = id.to_string();
        self.report(ReferenceKind::String, id, &placeholder, context);
        placeholder
    }

    /// Register every thread that has a name row
    fn named_threads(&mut self) {
        let tracks: Vec<Track> = self.thread_name_ids.keys().copied().collect();
        for track in tracks {
            self.thread(track);
        }
    }

    /// Register a host thread track, naming it and its process
    fn thread(&mut self, track: Track) {
        if self.threads.contains_key(&track) {
            return;
        }
        self.process(track.pid);

        let name = match self.thread_name_ids.get(&track).copied() {
            Some(name_id) => self.string(name_id, "thread name"),
            None => format!("Thread {}", track.tid),
        };
        self.threads.insert(track, name);
    }

    fn process(&mut self, pid: u64) {
        if self.processes.contains_key(&pid) {
            return;
        }
        let placeholder = format!("Process {}", pid);
        self.report(ReferenceKind::Process, pid as i64, &placeholder, "thread owner");
        self.processes.insert(pid, placeholder);
    }

    fn device(&mut self, pid: u64) {
        self.processes
            .entry(pid)
            .or_insert_with(|| format!("Device {}", pid.saturating_sub(DEVICE_PID_BASE)));
    }

    /// Register a kernel stream track
    fn stream(&mut self, track: Track) {
        self.device(track.pid);
        self.threads
            .entry(track)
            .or_insert_with(|| format!("Stream {}", track.tid));
    }

    /// Register a lane of projected NVTX ranges
    fn nvtx_lane(&mut self, track: Track, lane: usize) {
        self.device(track.pid);
        self.threads.entry(track).or_insert_with(|| match lane {
            0 => "NVTX (kernels)".to_string(),
            n => format!("NVTX (kernels) {}", n + 1),
        });
    }

    fn report(&mut self, kind: ReferenceKind, id: i64, placeholder: &str, context: &str) {
        if !self.reported.insert((kind, id)) {
            return;
        }
        let warning = ReferenceResolutionWarning {
            kind,
            id,
            placeholder: placeholder.to_string(),
            context: context.to_string(),
        };
        warn!("{}", warning);
        self.unresolved.push(warning);
    }

    fn finish(self, events: Vec<EventDescriptor>) -> NormalizedTrace {
        NormalizedTrace {
            events,
            processes: self.processes,
            threads: self.threads,
            unresolved: self.unresolved,
        }
    }
}
