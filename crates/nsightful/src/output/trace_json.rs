//! Trace Event Format rendering of an assembled NSYS trace.
//!
//! Metadata events naming processes and threads come first, followed by
//! the data events in the model's emitted order. `ts` and `dur` are always
//! microseconds; the configured [`TimeUnit`] only selects `displayTimeUnit`.

use crate::nsys::schema::{Args, ArgValue, Phase, TraceEvent, TraceModel};
use crate::utils::config::{NsysConfig, TimeUnit, TraceLayout, NANOS_PER_MICRO};
use crate::utils::error::OutputError;
use log::warn;
use serde::Serialize;
use serde_json::json;

/// Microsecond timestamp as written to JSON
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
enum JsonTime {
    Int(u64),
    Float(f64),
}

impl JsonTime {
    fn from_nanos(nanos: u64) -> Self {
        if nanos % NANOS_PER_MICRO == 0 {
            Self::Int(nanos / NANOS_PER_MICRO)
        } else {
            Self::Float(nanos as f64 / NANOS_PER_MICRO as f64)
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonEvent<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cat: Option<&'a str>,
    ph: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<JsonTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<JsonTime>,
    pid: u64,
    tid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<&'a str>,
    #[serde(skip_serializing_if = "Args::is_empty")]
    args: Args,
    #[serde(skip_serializing_if = "Option::is_none")]
    cname: Option<&'a str>,
}

impl<'a> JsonEvent<'a> {
    fn metadata(kind: &'a str, pid: u64, tid: u64, name: &str) -> Self {
        let mut args = Args::new();
        args.insert("name".to_string(), ArgValue::from(name));
        Self {
            name: kind,
            cat: None,
            ph: Phase::Metadata,
            ts: None,
            dur: None,
            pid,
            tid,
            id: None,
            s: None,
            args,
            cname: None,
        }
    }

    fn data(event: &'a TraceEvent) -> Self {
        Self {
            name: &event.name,
            cat: event.category.as_deref(),
            ph: event.phase,
            ts: Some(JsonTime::from_nanos(event.ts)),
            dur: event.dur.map(JsonTime::from_nanos),
            pid: event.pid,
            tid: event.tid,
            id: Some(event.id),
            // Instants are scoped to their thread
            s: (event.phase == Phase::Instant).then_some("t"),
            args: event.args.clone(),
            cname: event.color.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonTrace<'a> {
    trace_events: Vec<JsonEvent<'a>>,
    display_time_unit: &'static str,
    other_data: serde_json::Value,
}

/// Render an assembled trace as Trace Event Format JSON
///
/// **Public** - main entry point for trace output
///
/// # Arguments
/// * `model` - Assembled trace
/// * `config` - Display unit, layout and formatting options
///
/// # Errors
/// * `OutputError::SerializationFailed` - JSON serialization error
///
/// # Example
/// ```ignore
/// let model = convert_nsys_file("report.sqlite", &config)?;
/// let json = render_trace_json(&model, &config)?;
/// ```
pub fn render_trace_json(model: &TraceModel, config: &NsysConfig) -> Result<String, OutputError> {
    let events = collect_events(model);

    let text = match config.layout {
        TraceLayout::Array => {
            if config.time_unit != TimeUnit::Microseconds {
                warn!("A bare event array has no displayTimeUnit; display unit ignored");
            }
            to_string(&events, config.pretty)?
        }
        TraceLayout::Object => {
            let trace = JsonTrace {
                trace_events: events,
                display_time_unit: match config.time_unit {
                    TimeUnit::Microseconds => "ms",
                    TimeUnit::Nanoseconds => "ns",
                },
                other_data: other_data(model),
            };
            to_string(&trace, config.pretty)?
        }
    };

    Ok(text)
}

fn collect_events(model: &TraceModel) -> Vec<JsonEvent<'_>> {
    let mut events = Vec::with_capacity(
        model.processes.len() + model.threads.len() + model.events.len(),
    );

    for (pid, name) in &model.processes {
        events.push(JsonEvent::metadata("process_name", *pid, 0, name));
    }
    for (track, name) in &model.threads {
        events.push(JsonEvent::metadata("thread_name", track.pid, track.tid, name));
    }
    events.extend(model.events.iter().map(JsonEvent::data));

    events
}

fn other_data(model: &TraceModel) -> serde_json::Value {
    let warnings = &model.warnings;
    json!({
        "warnings": {
            "unresolved_references": warnings.unresolved_references.len(),
            "nesting_violations": warnings.nesting_violations.len(),
            "details": warnings
                .unresolved_references
                .iter()
                .map(ToString::to_string)
                .chain(warnings.nesting_violations.iter().map(ToString::to_string))
                .collect::<Vec<_>>(),
        }
    })
}

fn to_string<T: Serialize>(value: &T, pretty: bool) -> Result<String, OutputError> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nsys::schema::Track;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn event(id: u64, phase: Phase, ts: u64, dur: Option<u64>) -> TraceEvent {
        TraceEvent {
            id,
            name: format!("e{}", id),
            category: Some("cuda".into()),
            phase,
            ts,
            dur,
            pid: 1,
            tid: 2,
            args: Args::new(),
            color: None,
        }
    }

    fn model(events: Vec<TraceEvent>) -> TraceModel {
        let mut model = TraceModel {
            events,
            ..Default::default()
        };
        model.processes.insert(1, "app".into());
        model.threads.insert(Track::new(1, 2), "main".into());
        model
    }

    #[test]
    fn test_metadata_precedes_data_events() {
        let json = render_trace_json(
            &model(vec![event(1, Phase::Complete, 5_000, Some(2_000))]),
            &NsysConfig::default(),
        )
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let events = value["traceEvents"].as_array().unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["name"], "process_name");
        assert_eq!(events[0]["args"]["name"], "app");
        assert_eq!(events[1]["name"], "thread_name");
        assert_eq!(events[1]["tid"], 2);
        assert_eq!(events[2]["ph"], "X");
        assert_eq!(events[2]["ts"], 5);
        assert_eq!(events[2]["dur"], 2);
        assert_eq!(events[2]["id"], 1);
    }

    #[test]
    fn test_fractional_microseconds_are_floats() {
        assert_eq!(JsonTime::from_nanos(1_500), JsonTime::Float(1.5));
        assert_eq!(JsonTime::from_nanos(3_000), JsonTime::Int(3));
        assert_eq!(JsonTime::from_nanos(1_234), JsonTime::Float(1.234));
    }

    #[test]
    fn test_nanosecond_display_keeps_microsecond_timestamps() {
        let events = vec![event(1, Phase::Complete, 2_000_000, Some(1_500))];
        let micro = render_trace_json(&model(events.clone()), &NsysConfig::default()).unwrap();
        let nano = render_trace_json(
            &model(events),
            &NsysConfig {
                time_unit: TimeUnit::Nanoseconds,
                ..Default::default()
            },
        )
        .unwrap();

        let micro: Value = serde_json::from_str(&micro).unwrap();
        let nano: Value = serde_json::from_str(&nano).unwrap();
        assert_eq!(micro["displayTimeUnit"], "ms");
        assert_eq!(nano["displayTimeUnit"], "ns");
        assert_eq!(nano["traceEvents"][2]["ts"], 2_000);
        assert_eq!(nano["traceEvents"][2]["dur"], 1.5);
        assert_eq!(micro["traceEvents"], nano["traceEvents"]);
    }

    #[test]
    fn test_array_layout_ignores_display_unit() {
        let config = NsysConfig {
            layout: TraceLayout::Array,
            time_unit: TimeUnit::Nanoseconds,
            ..Default::default()
        };
        let json = render_trace_json(
            &model(vec![event(1, Phase::Complete, 2_000_000, Some(1_500))]),
            &config,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[2]["ts"], 2_000);
        assert_eq!(value[2]["dur"], 1.5);
    }

    #[test]
    fn test_array_layout_is_bare_list() {
        let config = NsysConfig {
            layout: TraceLayout::Array,
            ..Default::default()
        };
        let json = render_trace_json(&model(vec![]), &config).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_instant_and_color_fields() {
        let mut mark = event(1, Phase::Instant, 7_000, None);
        mark.color = Some("good".into());
        let json = render_trace_json(&model(vec![mark]), &NsysConfig::default()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let mark = &value["traceEvents"][2];

        assert_eq!(mark["ph"], "i");
        assert_eq!(mark["s"], "t");
        assert_eq!(mark["cname"], "good");
        assert!(mark.get("dur").is_none());
        assert!(mark.get("args").is_none());
    }

    #[test]
    fn test_warning_counts_in_other_data() {
        let json = render_trace_json(&model(vec![]), &NsysConfig::default()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["otherData"]["warnings"]["unresolved_references"], 0);
        assert_eq!(value["otherData"]["warnings"]["nesting_violations"], 0);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let m = model(vec![
            event(1, Phase::Complete, 0, Some(100)),
            event(2, Phase::Complete, 10, Some(40)),
        ]);
        let a = render_trace_json(&m, &NsysConfig::default()).unwrap();
        let b = render_trace_json(&m, &NsysConfig::default()).unwrap();
        assert_eq!(a, b);
    }
}
