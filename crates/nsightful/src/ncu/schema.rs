//! Nested kernel -> section -> {metrics, advisories} model for NCU reports.
//!
//! `ParsedProfile` is the parse result; `ProfileDict` is the plain nested
//! mapping handed to programmatic consumers. Its key names and nesting depth
//! are a stable boundary contract.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Launch identifier from the `ID` column.
///
/// Repeated launches of the same kernel carry distinct ids, so the model
/// keys on this rather than on the kernel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KernelId(pub String);

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single metric row. `value` is kept exactly as exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub unit: String,
    pub value: String,
}

/// Severity of a rule advisory, taken from the `Rule Type` marker token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    Optimization,
    Warning,
    Info,
}

impl AdvisoryKind {
    /// Parse a marker token (`OPT`, `WRN`, `INF`)
    pub fn from_marker(token: &str) -> Option<Self> {
        match token.trim() {
            "OPT" => Some(Self::Optimization),
            "WRN" => Some(Self::Warning),
            "INF" => Some(Self::Info),
            _ => None,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Self::Optimization => "OPT",
            Self::Warning => "WRN",
            Self::Info => "INF",
        }
    }

    /// Markdown prefix: emoji plus bold severity word
    pub fn label(self) -> &'static str {
        match self {
            Self::Optimization => "🔧 **OPTIMIZATION**",
            Self::Warning => "⚠️ **WARNING**",
            Self::Info => "ℹ️ **INFO**",
        }
    }
}

/// Estimated speedup attached to an advisory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatedSpeedup {
    /// e.g. "local", "global", "estimated"
    pub kind: String,
    pub value: String,
}

/// A rule advisory attached to a section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    /// Rule identifier, e.g. `SOLBottleneck`
    pub rule: String,
    pub kind: AdvisoryKind,
    /// One logical paragraph; soft line breaks already rejoined
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup: Option<EstimatedSpeedup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub metrics: Vec<MetricRecord>,
    pub advisories: Vec<AdvisoryRecord>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: Vec::new(),
            advisories: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.advisories.is_empty()
    }
}

/// One profiled kernel launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kernel {
    pub id: KernelId,
    /// Base name (template and parameter lists stripped)
    pub name: String,
    /// Verbatim `Kernel Name` cell
    pub full_name: String,
    pub sections: IndexMap<String, Section>,
}

/// Root of the NCU model, kernels in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedProfile {
    pub kernels: IndexMap<KernelId, Kernel>,
}

impl ParsedProfile {
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// Display label for every kernel, in model order.
    ///
    /// The base name when it is unique in the profile, `name [ID]` when
    /// several launches share it.
    pub fn labelled_kernels(&self) -> Vec<(String, &Kernel)> {
        let mut launches: HashMap<&str, usize> = HashMap::new();
        for kernel in self.kernels.values() {
            *launches.entry(kernel.name.as_str()).or_insert(0) += 1;
        }

        self.kernels
            .values()
            .map(|kernel| {
                let label = if launches[kernel.name.as_str()] > 1 {
                    format!("{} [{}]", kernel.name, kernel.id)
                } else {
                    kernel.name.clone()
                };
                (label, kernel)
            })
            .collect()
    }

    /// Total number of metric rows across all kernels
    pub fn metric_count(&self) -> usize {
        self.kernels
            .values()
            .flat_map(|k| k.sections.values())
            .map(|s| s.metrics.len())
            .sum()
    }

    /// Total number of advisories across all kernels
    pub fn advisory_count(&self) -> usize {
        self.kernels
            .values()
            .flat_map(|k| k.sections.values())
            .map(|s| s.advisories.len())
            .sum()
    }

    /// Convert to the plain nested mapping
    pub fn to_dict(&self) -> ProfileDict {
        self.labelled_kernels()
            .into_iter()
            .map(|(label, kernel)| {
                let sections = kernel
                    .sections
                    .values()
                    .map(|section| (section.name.clone(), SectionDict::from(section)))
                    .collect();
                (label, sections)
            })
            .collect()
    }
}

/// kernel label -> section name -> {"metrics": [...], "rules": [...]}
pub type ProfileDict = IndexMap<String, IndexMap<String, SectionDict>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDict {
    pub metrics: Vec<MetricDict>,
    pub rules: Vec<RuleDict>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDict {
    pub name: String,
    pub unit: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDict {
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub description: String,
    pub speedup_type: String,
    pub speedup: String,
}

impl From<&Section> for SectionDict {
    fn from(section: &Section) -> Self {
        Self {
            metrics: section
                .metrics
                .iter()
                .map(|m| MetricDict {
                    name: m.name.clone(),
                    unit: m.unit.clone(),
                    value: m.value.clone(),
                })
                .collect(),
            rules: section.advisories.iter().map(RuleDict::from).collect(),
        }
    }
}

impl From<&AdvisoryRecord> for RuleDict {
    fn from(advisory: &AdvisoryRecord) -> Self {
        let (speedup_type, speedup) = advisory
            .speedup
            .as_ref()
            .map(|s| (s.kind.clone(), s.value.clone()))
            .unwrap_or_default();

        Self {
            name: advisory.rule.clone(),
            rule_type: advisory.kind.marker().to_string(),
            description: advisory.body.clone(),
            speedup_type,
            speedup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(id: &str, name: &str) -> Kernel {
        Kernel {
            id: KernelId(id.to_string()),
            name: name.to_string(),
            full_name: format!("{}(int*)", name),
            sections: IndexMap::new(),
        }
    }

    #[test]
    fn test_labels_disambiguate_repeated_launches() {
        let mut profile = ParsedProfile::default();
        for (id, name) in [("0", "saxpy"), ("1", "reduce"), ("2", "saxpy")] {
            profile.kernels.insert(KernelId(id.into()), kernel(id, name));
        }

        let labels: Vec<String> = profile
            .labelled_kernels()
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["saxpy [0]", "reduce", "saxpy [2]"]);
    }

    #[test]
    fn test_dict_uses_snake_case_rule_keys() {
        let mut section = Section::new("Memory Workload");
        section.advisories.push(AdvisoryRecord {
            rule: "MemoryBound".into(),
            kind: AdvisoryKind::Warning,
            body: "Memory bandwidth utilization is high.".into(),
            speedup: Some(EstimatedSpeedup {
                kind: "estimated".into(),
                value: "15.5".into(),
            }),
        });
        let mut k = kernel("0", "simple_kernel");
        k.sections.insert(section.name.clone(), section);
        let mut profile = ParsedProfile::default();
        profile.kernels.insert(k.id.clone(), k);

        let json = serde_json::to_value(profile.to_dict()).unwrap();
        let rule = &json["simple_kernel"]["Memory Workload"]["rules"][0];
        assert_eq!(rule["type"], "WRN");
        assert_eq!(rule["speedup_type"], "estimated");
        assert_eq!(rule["speedup"], "15.5");
        assert!(json["simple_kernel"]["Memory Workload"]["metrics"]
            .as_array()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_advisory_markers() {
        assert_eq!(AdvisoryKind::from_marker("WRN"), Some(AdvisoryKind::Warning));
        assert_eq!(AdvisoryKind::from_marker(" OPT "), Some(AdvisoryKind::Optimization));
        assert_eq!(AdvisoryKind::from_marker("ERR"), None);
        assert_eq!(AdvisoryKind::Info.label(), "ℹ️ **INFO**");
    }
}
