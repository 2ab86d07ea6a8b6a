//! Configuration and constants for both conversion pipelines.
//!
//! Settings are read from an optional TOML file (see [`load_config`]) and
//! can be overridden from the command line.

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Current structured-output schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

// Columns that identify the NCU details table header (order-insensitive)
pub const NCU_REQUIRED_COLUMNS: &[&str] = &[
    "ID",
    "Kernel Name",
    "Section Name",
    "Metric Name",
    "Metric Unit",
    "Metric Value",
];

// Rule columns are optional; a file without them simply carries no advisories
pub const NCU_RULE_COLUMNS: &[&str] = &[
    "Rule Name",
    "Rule Type",
    "Rule Description",
    "Estimated Speedup Type",
    "Estimated Speedup",
];

// NSYS SQLite export tables
pub const TABLE_STRINGS: &str = "StringIds";
pub const TABLE_PROCESSES: &str = "PROCESSES";
pub const TABLE_THREAD_NAMES: &str = "ThreadNames";
pub const TABLE_KERNELS: &str = "CUPTI_ACTIVITY_KIND_KERNEL";
pub const TABLE_RUNTIME: &str = "CUPTI_ACTIVITY_KIND_RUNTIME";
pub const TABLE_NVTX: &str = "NVTX_EVENTS";

// NVTX eventType for marks (instant events without an end time)
pub const NVTX_MARK_EVENT_TYPE: i64 = 34;

// globalTid / globalPid packing: pid and tid are the low 24-bit fields
pub const GLOBAL_ID_FIELD_BITS: u32 = 24;
pub const GLOBAL_ID_FIELD_MASK: u64 = 0xFF_FFFF;

// Synthetic pids for GPU devices sit just above any 24-bit OS pid
pub const DEVICE_PID_BASE: u64 = 1 << 24;

// Synthetic device-track lane for NVTX ranges projected onto kernels
pub const NVTX_KERNEL_TID: u64 = u32::MAX as u64;

pub const NANOS_PER_MICRO: u64 = 1_000;

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NsightfulConfig {
    /// Nsight Compute (CSV to Markdown) settings
    #[serde(default)]
    pub ncu: NcuConfig,

    /// Nsight Systems (SQLite to trace JSON) settings
    #[serde(default)]
    pub nsys: NsysConfig,
}

/// Settings for the NCU pipeline
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NcuConfig {
    /// Order in which sections are rendered
    #[serde(default)]
    pub section_order: SectionOrder,
}

/// Section ordering for Markdown output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionOrder {
    /// First-seen order from the input
    #[default]
    Model,
    /// Well-known sections first in their canonical order, then the rest in model order
    Canonical,
}

/// Settings for the NSYS pipeline
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NsysConfig {
    /// Activity types to convert
    #[serde(default = "NsysActivity::all")]
    pub activities: Vec<NsysActivity>,

    /// Keep only NVTX ranges whose name starts with one of these prefixes
    #[serde(default)]
    pub event_prefix: Vec<String>,

    #[serde(default)]
    pub interval_encoding: IntervalEncoding,

    #[serde(default)]
    pub time_unit: TimeUnit,

    #[serde(default)]
    pub layout: TraceLayout,

    /// Pretty-print the JSON output
    #[serde(default)]
    pub pretty: bool,

    /// Fail the conversion when more warnings than this are produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_warnings: Option<usize>,

    /// Name prefix -> trace viewer reserved color name
    #[serde(default)]
    pub color_scheme: BTreeMap<String, String>,
}

impl Default for NsysConfig {
    fn default() -> Self {
        Self {
            activities: NsysActivity::all(),
            event_prefix: Vec::new(),
            color_scheme: BTreeMap::new(),
            interval_encoding: IntervalEncoding::default(),
            time_unit: TimeUnit::default(),
            layout: TraceLayout::default(),
            pretty: false,
            max_warnings: None,
        }
    }
}

impl NsysConfig {
    /// Whether an activity type is selected
    pub fn wants(&self, activity: NsysActivity) -> bool {
        self.activities.contains(&activity)
    }

    /// Color for an event name, matched by the longest configured prefix
    pub fn color_for(&self, name: &str) -> Option<String> {
        self.color_scheme
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, color)| color.clone())
    }

    /// Whether an NVTX range name passes the prefix filter
    pub fn accepts_nvtx(&self, name: &str) -> bool {
        self.event_prefix.is_empty()
            || self
                .event_prefix
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

/// Activity types that can be extracted from an NSYS export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum NsysActivity {
    /// GPU kernel executions
    #[serde(rename = "kernel")]
    Kernel,
    /// NVTX ranges and marks on host threads
    #[serde(rename = "nvtx")]
    NvtxCpu,
    /// NVTX ranges projected onto the kernels they launched
    #[serde(rename = "nvtx-kernel")]
    NvtxKernel,
    /// CUDA runtime API calls
    #[serde(rename = "cuda-api")]
    CudaApi,
}

impl NsysActivity {
    pub fn all() -> Vec<Self> {
        vec![Self::Kernel, Self::NvtxCpu, Self::NvtxKernel, Self::CudaApi]
    }

    /// Category string written to the `cat` field of trace events
    pub fn category(self) -> &'static str {
        match self {
            Self::Kernel => "cuda",
            Self::NvtxCpu => "nvtx",
            Self::NvtxKernel => "nvtx-kernel",
            Self::CudaApi => "cuda_api",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::NvtxCpu => "nvtx",
            Self::NvtxKernel => "nvtx-kernel",
            Self::CudaApi => "cuda-api",
        }
    }
}

impl fmt::Display for NsysActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NsysActivity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kernel" => Ok(Self::Kernel),
            "nvtx" => Ok(Self::NvtxCpu),
            "nvtx-kernel" => Ok(Self::NvtxKernel),
            "cuda-api" => Ok(Self::CudaApi),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown activity '{}' (expected kernel, nvtx, nvtx-kernel or cuda-api)",
                other
            ))),
        }
    }
}

/// How interval events are encoded in the trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalEncoding {
    /// One `X` event carrying start and duration
    #[default]
    Complete,
    /// A `B`/`E` pair
    BeginEnd,
}

/// Display unit of the rendered trace
///
/// `ts`/`dur` are written in microseconds either way; this only sets
/// `displayTimeUnit` in the object layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// `displayTimeUnit: "ms"`
    #[default]
    Microseconds,
    /// `displayTimeUnit: "ns"`
    Nanoseconds,
}

/// Top-level JSON shape of the rendered trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLayout {
    /// `{"traceEvents": [...], "displayTimeUnit": ..., "otherData": {...}}`
    #[default]
    Object,
    /// Bare event array
    Array,
}

/// Load configuration from a TOML file
///
/// # Errors
/// * `ConfigError::Io` - If file cannot be read
/// * `ConfigError::Parse` - If TOML is invalid
///
/// # Example
/// ```ignore
/// let config = load_config("nsightful.toml")?;
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<NsightfulConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: NsightfulConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Serialize the effective configuration back to TOML
pub fn config_to_toml(config: &NsightfulConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_select_all_activities() {
        let config = NsightfulConfig::default();
        assert_eq!(config.nsys.activities.len(), 4);
        assert_eq!(config.ncu.section_order, SectionOrder::Model);
        assert_eq!(config.nsys.layout, TraceLayout::Object);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: NsightfulConfig = toml::from_str(
            r#"
            [ncu]
            section_order = "canonical"

            [nsys]
            activities = ["kernel", "cuda-api"]
            event_prefix = ["compute"]
            time_unit = "nanoseconds"

            [nsys.color_scheme]
            compute = "thread_state_running"
            "#,
        )
        .unwrap();

        assert_eq!(config.ncu.section_order, SectionOrder::Canonical);
        assert_eq!(
            config.nsys.activities,
            vec![NsysActivity::Kernel, NsysActivity::CudaApi]
        );
        assert!(config.nsys.wants(NsysActivity::Kernel));
        assert!(!config.nsys.wants(NsysActivity::NvtxCpu));
        assert_eq!(config.nsys.time_unit, TimeUnit::Nanoseconds);
        assert_eq!(config.nsys.interval_encoding, IntervalEncoding::Complete);
        assert_eq!(
            config.nsys.color_for("compute_kernel").as_deref(),
            Some("thread_state_running")
        );
    }

    #[test]
    fn test_longest_color_prefix_wins() {
        let mut config = NsysConfig::default();
        config.color_scheme.insert("mem".into(), "grey".into());
        config.color_scheme.insert("memcpy".into(), "yellow".into());

        assert_eq!(config.color_for("memcpy_h2d").as_deref(), Some("yellow"));
        assert_eq!(config.color_for("memset").as_deref(), Some("grey"));
        assert_eq!(config.color_for("other"), None);
    }

    #[test]
    fn test_prefix_filter() {
        let mut config = NsysConfig::default();
        assert!(config.accepts_nvtx("anything"));

        config.event_prefix = vec!["compute".into(), "io".into()];
        assert!(config.accepts_nvtx("compute_step"));
        assert!(config.accepts_nvtx("io_read"));
        assert!(!config.accepts_nvtx("memory_copy"));
    }

    #[test]
    fn test_activity_from_str() {
        assert_eq!("nvtx-kernel".parse::<NsysActivity>().unwrap(), NsysActivity::NvtxKernel);
        assert_eq!("CUDA-API".parse::<NsysActivity>().unwrap(), NsysActivity::CudaApi);
        assert!("gpu".parse::<NsysActivity>().is_err());
        assert_eq!(NsysActivity::CudaApi.category(), "cuda_api");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = NsightfulConfig::default();
        config.nsys.max_warnings = Some(3);
        let text = config_to_toml(&config).unwrap();
        let back: NsightfulConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
