//! Nsight Compute CSV parsing.
//!
//! This module handles:
//! - Reassembling logical CSV rows from the raw export
//! - Classifying rows into kernel/section/metric/advisory records
//! - Building the nested `ParsedProfile` model

pub mod builder;
pub mod classifier;
pub mod schema;
pub mod sections;

// Re-export main types
pub use builder::TreeBuilder;
pub use classifier::{Classifier, LogicalRow, Record};
pub use schema::{
    AdvisoryKind, AdvisoryRecord, EstimatedSpeedup, Kernel, KernelId, MetricDict, MetricRecord,
    ParsedProfile, ProfileDict, RuleDict, Section, SectionDict,
};

use crate::utils::error::NcuError;
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Parse an NCU CSV export from any reader
///
/// **Public** - main entry point for the NCU pipeline
///
/// The whole input is consumed before the profile is returned; on any
/// error the partially built tree is dropped and only the error is returned.
///
/// # Errors
/// * `NcuError::Structural` - A row violates the expected grammar
/// * `NcuError::Csv` - The input is not readable as CSV
pub fn parse_ncu_csv<R: Read>(reader: R) -> Result<ParsedProfile, NcuError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut classifier = Classifier::new();
    let mut builder = TreeBuilder::new();
    let mut record = csv::StringRecord::new();
    let mut rows = 0usize;

    while csv_reader.read_record(&mut record)? {
        let row = LogicalRow::from(&record);
        rows += 1;
        for classified in classifier.classify(&row)? {
            builder.push(classified, row.line)?;
        }
    }

    let profile = builder.finish();
    debug!(
        "Parsed {} logical rows into {} kernels ({} metrics, {} advisories)",
        rows,
        profile.kernels.len(),
        profile.metric_count(),
        profile.advisory_count()
    );
    Ok(profile)
}

/// Parse an NCU CSV export held in memory
pub fn parse_ncu_str(text: &str) -> Result<ParsedProfile, NcuError> {
    parse_ncu_csv(text.as_bytes())
}

/// Parse an NCU CSV export from an iterator of lines (with or without line terminators)
pub fn parse_ncu_lines<I, S>(lines: I) -> Result<ParsedProfile, NcuError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for line in lines {
        text.push_str(line.as_ref().trim_end_matches(['\r', '\n']));
        text.push('\n');
    }
    parse_ncu_str(&text)
}

/// Parse an NCU CSV export from a file path
///
/// # Errors
/// * `NcuError::Io` - The file cannot be opened
/// * Any error of [`parse_ncu_csv`]
pub fn parse_ncu_file(path: impl AsRef<Path>) -> Result<ParsedProfile, NcuError> {
    let path = path.as_ref();
    info!("Reading NCU export: {}", path.display());

    let file = File::open(path)?;
    parse_ncu_csv(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#""ID","Process ID","Process Name","Host Name","Kernel Name","Context","Stream","Block Size","Grid Size","Device","CC","Section Name","Metric Name","Metric Unit","Metric Value","Rule Name","Rule Type","Rule Description","Estimated Speedup Type","Estimated Speedup""#;

    fn csv(rows: &[&str]) -> String {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text
    }

    #[test]
    fn test_header_only_yields_empty_profile() {
        let profile = parse_ncu_str(HEADER).unwrap();
        assert!(profile.is_empty());
    }

    #[test]
    fn test_empty_input_yields_empty_profile() {
        assert!(parse_ncu_str("").unwrap().is_empty());
    }

    #[test]
    fn test_values_are_kept_verbatim() {
        let profile = parse_ncu_str(&csv(&[
            r#""0","1","app","host","k(int*)","1","7","(256, 1, 1)","(128, 1, 1)","0","7.5","GPU Speed Of Light Throughput","DRAM Frequency","hz","1,215,000,000.00","","","","","""#,
        ]))
        .unwrap();

        let kernel = &profile.kernels[&KernelId("0".into())];
        assert_eq!(kernel.name, "k");
        assert_eq!(kernel.full_name, "k(int*)");
        let metric = &kernel.sections["Speed Of Light"].metrics[0];
        assert_eq!(metric.value, "1,215,000,000.00");
    }

    #[test]
    fn test_reopened_section_is_structural_error() {
        let err = parse_ncu_str(&csv(&[
            r#""0","1","app","host","k","1","7","","","0","7.5","Occupancy","Achieved Occupancy","%","50","","","","","""#,
            r#""0","1","app","host","k","1","7","","","0","7.5","Launch Statistics","Grid Size","","128","","","","","""#,
            r#""0","1","app","host","k","1","7","","","0","7.5","Occupancy","Theoretical Occupancy","%","100","","","","","""#,
        ]))
        .unwrap_err();

        match err {
            NcuError::Structural { line, message, .. } => {
                assert_eq!(line, 4);
                assert!(message.contains("reopened"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_interleaved_launch_is_structural_error() {
        let err = parse_ncu_str(&csv(&[
            r#""0","1","app","host","a","1","7","","","0","7.5","Occupancy","M","%","1","","","","","""#,
            r#""1","1","app","host","b","1","7","","","0","7.5","Occupancy","M","%","1","","","","","""#,
            r#""0","1","app","host","a","1","7","","","0","7.5","Launch Statistics","M","","1","","","","","""#,
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("reappears"));
    }

    #[test]
    fn test_lines_entry_point_matches_reader() {
        let text = csv(&[
            r#""0","1","app","host","k","1","7","","","0","7.5","Occupancy","Achieved Occupancy","%","50","","","","","""#,
        ]);
        let from_lines = parse_ncu_lines(text.lines().map(|l| format!("{}\r\n", l))).unwrap();
        let from_str = parse_ncu_str(&text).unwrap();
        assert_eq!(from_lines, from_str);
    }
}
