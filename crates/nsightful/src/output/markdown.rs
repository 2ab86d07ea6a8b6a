//! Markdown rendering of NCU profiles.
//!
//! Both entry points go through the same writer over the plain nested
//! mapping, so rendering a `ParsedProfile` and rendering its `ProfileDict`
//! always produce byte-identical output.

use crate::ncu::classifier::join_soft_breaks;
use crate::ncu::schema::{AdvisoryKind, ParsedProfile, ProfileDict, RuleDict, SectionDict};
use crate::ncu::sections::canonical_rank;
use crate::utils::config::{NcuConfig, SectionOrder};
use indexmap::IndexMap;

const TABLE_HEADER: &str = "| Metric Name | Metric Unit | Metric Value |";
const TABLE_RULE: &str = "|-------------|-------------|--------------|";

/// Render a parsed profile as flat Markdown
///
/// **Public** - main entry point for Markdown output
///
/// # Example
/// ```ignore
/// let profile = parse_ncu_file("report.csv")?;
/// let markdown = render_markdown(&profile, &NcuConfig::default());
/// ```
pub fn render_markdown(profile: &ParsedProfile, config: &NcuConfig) -> String {
    render_markdown_dict(&profile.to_dict(), config)
}

/// Render the plain nested mapping as flat Markdown
pub fn render_markdown_dict(dict: &ProfileDict, config: &NcuConfig) -> String {
    let mut out = String::new();

    for (kernel, sections) in dict {
        out.push_str(&format!("# {}\n\n", kernel));

        if sections.is_empty() {
            out.push_str(&format!("No sections found for kernel: {}\n\n", kernel));
        }

        for (name, section) in ordered_sections(sections, config.section_order) {
            out.push_str(&render_section(name, section));
        }

        out.push_str("---\n\n");
    }

    out
}

/// Render one section: heading, metrics table, advisories
pub fn render_section(name: &str, section: &SectionDict) -> String {
    let mut out = String::new();
    out.push_str(&format!("## {}\n\n", name));

    if !section.metrics.is_empty() {
        out.push_str(TABLE_HEADER);
        out.push('\n');
        out.push_str(TABLE_RULE);
        out.push('\n');
        for metric in &section.metrics {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                escape_cell(&metric.name),
                escape_cell(&metric.unit),
                escape_cell(&metric.value)
            ));
        }
        out.push('\n');
    }

    for rule in &section.rules {
        out.push_str(&render_rule(rule));
    }

    out
}

fn render_rule(rule: &RuleDict) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}: {}\n",
        rule_label(&rule.rule_type),
        rule.description
    ));

    if !rule.speedup.is_empty() && !rule.speedup_type.is_empty() {
        out.push_str(&format!(
            "*Estimated Speedup ({}): {}%*\n",
            rule.speedup_type, rule.speedup
        ));
    }

    out.push('\n');
    out
}

/// Emoji and bold severity word for a rule marker
pub fn rule_label(marker: &str) -> String {
    match AdvisoryKind::from_marker(marker) {
        Some(kind) => kind.label().to_string(),
        None => format!("**{}**", marker),
    }
}

fn ordered_sections(
    sections: &IndexMap<String, SectionDict>,
    order: SectionOrder,
) -> Vec<(&str, &SectionDict)> {
    let mut ordered: Vec<(&str, &SectionDict)> =
        sections.iter().map(|(k, v)| (k.as_str(), v)).collect();

    if order == SectionOrder::Canonical {
        // Stable sort keeps model order among unknown sections
        ordered.sort_by_key(|(name, _)| canonical_rank(name).unwrap_or(usize::MAX));
    }

    ordered
}

/// A table cell must stay on one physical line
fn escape_cell(text: &str) -> String {
    join_soft_breaks(text).replace('\r', " ").replace('|', "\\|")
}
