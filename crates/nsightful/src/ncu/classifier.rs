//! Record classifier for NCU CSV exports.
//!
//! An explicit state machine over *logical* CSV rows (quoted multi-line
//! cells already reassembled by the CSV reader). Each row is turned into
//! zero or more tagged [`Record`]s; anything that matches no rule is a
//! structural error carrying the row's line number and the current
//! kernel/section.
//!
//! Transition table:
//!
//! | Mode            | Row                         | Records                          | Next mode       |
//! |-----------------|-----------------------------|----------------------------------|-----------------|
//! | any             | all fields empty            | `Blank`                          | unchanged       |
//! | AwaitingHeader  | required columns present    | `TableHeader`                    | InTable         |
//! | AwaitingHeader  | anything else               | error                            |                 |
//! | InTable         | header again / wrong width  | error                            |                 |
//! | InTable         | new launch id               | `KernelBoundary`, then as below  | kernel set      |
//! | InTable         | no section name             | `Blank` unless a kernel opened   | unchanged       |
//! | InTable         | new canonical section       | `SectionBoundary`, then as below | section set     |
//! | InTable         | metric and/or known rule    | `Metric` and/or `Advisory`       | unchanged       |
//! | InTable         | section only, or bad marker | error                            |                 |

use super::schema::{AdvisoryKind, AdvisoryRecord, EstimatedSpeedup, KernelId, MetricRecord};
use super::sections::canonical_section_name;
use crate::utils::config::{NCU_REQUIRED_COLUMNS, NCU_RULE_COLUMNS};
use crate::utils::error::NcuError;
use log::debug;

/// One logical CSV row and the physical line it starts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRow {
    pub line: u64,
    pub fields: Vec<String>,
}

impl LogicalRow {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

impl From<&csv::StringRecord> for LogicalRow {
    fn from(record: &csv::StringRecord) -> Self {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        Self::new(line, record.iter().map(str::to_string).collect())
    }
}

/// Column positions resolved from the header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    width: usize,
    id: usize,
    kernel_name: usize,
    section_name: usize,
    metric_name: usize,
    metric_unit: usize,
    metric_value: usize,
    rule_name: Option<usize>,
    rule_type: Option<usize>,
    rule_description: Option<usize>,
    speedup_type: Option<usize>,
    speedup: Option<usize>,
}

impl ColumnMap {
    /// Recognize a header row by its required column names, in any order
    pub fn from_header(fields: &[String]) -> Option<Self> {
        let position = |name: &str| {
            fields
                .iter()
                .position(|f| f.trim().trim_start_matches('\u{feff}') == name)
        };

        let mut required = NCU_REQUIRED_COLUMNS.iter().map(|c| position(c));
        let mut next = || required.next().flatten();
        let (id, kernel_name, section_name) = (next()?, next()?, next()?);
        let (metric_name, metric_unit, metric_value) = (next()?, next()?, next()?);

        let rule: Vec<Option<usize>> = NCU_RULE_COLUMNS.iter().map(|c| position(c)).collect();

        Some(Self {
            width: fields.len(),
            id,
            kernel_name,
            section_name,
            metric_name,
            metric_unit,
            metric_value,
            rule_name: rule[0],
            rule_type: rule[1],
            rule_description: rule[2],
            speedup_type: rule[3],
            speedup: rule[4],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn get<'a>(&self, row: &'a LogicalRow, index: usize) -> &'a str {
        row.fields.get(index).map(|f| f.trim()).unwrap_or("")
    }

    fn get_opt<'a>(&self, row: &'a LogicalRow, index: Option<usize>) -> &'a str {
        index.map(|i| self.get(row, i)).unwrap_or("")
    }
}

/// Tagged record produced from a logical row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    TableHeader(ColumnMap),
    KernelBoundary { id: KernelId, full_name: String },
    SectionBoundary { name: String },
    Metric(MetricRecord),
    Advisory(AdvisoryRecord),
    Blank,
}

/// Where the classifier currently is in the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    AwaitingHeader,
    InTable {
        columns: ColumnMap,
        kernel: Option<KernelPosition>,
        section: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelPosition {
    pub id: KernelId,
    pub full_name: String,
}

/// Finite-state row classifier
#[derive(Debug)]
pub struct Classifier {
    mode: Mode,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            mode: Mode::AwaitingHeader,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Classify the next logical row, advancing the mode.
    ///
    /// # Errors
    /// * `NcuError::Structural` - the row matches no rule
    pub fn classify(&mut self, row: &LogicalRow) -> Result<Vec<Record>, NcuError> {
        if row.is_blank() {
            return Ok(vec![Record::Blank]);
        }

        let (columns, kernel, section) = match &mut self.mode {
            Mode::AwaitingHeader => {
                let columns = ColumnMap::from_header(&row.fields).ok_or_else(|| {
                    structural(
                        row.line,
                        None,
                        None,
                        format!(
                            "expected the column header ({}) before any data",
                            NCU_REQUIRED_COLUMNS.join(", ")
                        ),
                    )
                })?;
                debug!("NCU header with {} columns at line {}", columns.width, row.line);
                self.mode = Mode::InTable {
                    columns: columns.clone(),
                    kernel: None,
                    section: None,
                };
                return Ok(vec![Record::TableHeader(columns)]);
            }
            Mode::InTable {
                columns,
                kernel,
                section,
            } => (columns, kernel, section),
        };

        let fail = |kernel: &Option<KernelPosition>, section: &Option<String>, message: String| {
            structural(
                row.line,
                kernel.as_ref().map(|k| k.full_name.clone()),
                section.clone(),
                message,
            )
        };

        if ColumnMap::from_header(&row.fields).is_some() {
            return Err(fail(kernel, section, "unexpected second column header".to_string()));
        }
        if row.fields.len() != columns.width {
            return Err(fail(
                kernel,
                section,
                format!(
                    "expected {} fields as in the header, found {}",
                    columns.width,
                    row.fields.len()
                ),
            ));
        }

        let id = columns.get(row, columns.id);
        let section_raw = columns.get(row, columns.section_name);
        let metric_name = columns.get(row, columns.metric_name);
        let rule_name = columns.get_opt(row, columns.rule_name);

        let mut records = Vec::with_capacity(3);

        if !id.is_empty() && kernel.as_ref().map(|k| k.id.0.as_str()) != Some(id) {
            let position = KernelPosition {
                id: KernelId(id.to_string()),
                full_name: columns.get(row, columns.kernel_name).to_string(),
            };
            records.push(Record::KernelBoundary {
                id: position.id.clone(),
                full_name: position.full_name.clone(),
            });
            *kernel = Some(position);
            *section = None;
        }

        if section_raw.is_empty() {
            debug!("Skipping row without section name at line {}", row.line);
            if records.is_empty() {
                records.push(Record::Blank);
            }
            return Ok(records);
        }
        if id.is_empty() {
            return Err(fail(kernel, section, "missing kernel launch ID".to_string()));
        }
        if metric_name.is_empty() && rule_name.is_empty() {
            return Err(fail(
                kernel,
                section,
                format!(
                    "row in section '{}' carries neither a metric nor a rule",
                    section_raw
                ),
            ));
        }

        let advisory = if rule_name.is_empty() {
            None
        } else {
            let marker = columns.get_opt(row, columns.rule_type);
            let kind = AdvisoryKind::from_marker(marker).ok_or_else(|| {
                fail(
                    kernel,
                    section,
                    format!("unknown advisory marker '{}' for rule '{}'", marker, rule_name),
                )
            })?;
            Some(AdvisoryRecord {
                rule: rule_name.to_string(),
                kind,
                body: join_soft_breaks(columns.get_opt(row, columns.rule_description)),
                speedup: speedup(
                    columns.get_opt(row, columns.speedup_type),
                    columns.get_opt(row, columns.speedup),
                ),
            })
        };

        let canonical = canonical_section_name(section_raw);
        if section.as_deref() != Some(canonical) {
            records.push(Record::SectionBoundary {
                name: canonical.to_string(),
            });
            *section = Some(canonical.to_string());
        }

        if !metric_name.is_empty() {
            records.push(Record::Metric(MetricRecord {
                name: metric_name.to_string(),
                unit: columns.get(row, columns.metric_unit).to_string(),
                value: columns.get(row, columns.metric_value).to_string(),
            }));
        }
        if let Some(advisory) = advisory {
            records.push(Record::Advisory(advisory));
        }

        Ok(records)
    }
}

fn structural(
    line: u64,
    kernel: Option<String>,
    section: Option<String>,
    message: String,
) -> NcuError {
    NcuError::Structural {
        line,
        kernel,
        section,
        message,
    }
}

fn speedup(kind: &str, value: &str) -> Option<EstimatedSpeedup> {
    if kind.is_empty() || value.is_empty() {
        return None;
    }
    Some(EstimatedSpeedup {
        kind: kind.to_string(),
        value: value.to_string(),
    })
}

/// Rejoin a body split across physical lines into one paragraph.
///
/// Every line break together with the whitespace around it becomes one space.
pub fn join_soft_breaks(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[&str] = &[
        "ID",
        "Kernel Name",
        "Section Name",
        "Metric Name",
        "Metric Unit",
        "Metric Value",
        "Rule Name",
        "Rule Type",
        "Rule Description",
        "Estimated Speedup Type",
        "Estimated Speedup",
    ];

    fn row(line: u64, fields: &[&str]) -> LogicalRow {
        LogicalRow::new(line, fields.iter().map(|f| f.to_string()).collect())
    }

    fn ready() -> Classifier {
        let mut classifier = Classifier::new();
        classifier.classify(&row(1, HEADER)).unwrap();
        classifier
    }

    #[test]
    fn test_header_is_order_insensitive() {
        let mut shuffled: Vec<&str> = HEADER.to_vec();
        shuffled.reverse();
        let map = ColumnMap::from_header(
            &shuffled.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
        .unwrap();
        assert_eq!(map.width(), HEADER.len());
        assert_eq!(map.id, HEADER.len() - 1);
    }

    #[test]
    fn test_header_without_rule_columns() {
        let fields: Vec<String> = HEADER[..6].iter().map(|s| s.to_string()).collect();
        let map = ColumnMap::from_header(&fields).unwrap();
        assert_eq!(map.rule_name, None);
    }

    #[test]
    fn test_data_before_header_is_rejected() {
        let mut classifier = Classifier::new();
        let err = classifier
            .classify(&row(1, &["This is not CSV data"]))
            .unwrap_err();
        assert!(matches!(err, NcuError::Structural { line: 1, .. }));
    }

    #[test]
    fn test_first_metric_row_opens_kernel_and_section() {
        let mut classifier = ready();
        let records = classifier
            .classify(&row(
                2,
                &["0", "k(int*)", "SpeedOfLight", "DRAM Frequency", "hz", "1,215", "", "", "", "", ""],
            ))
            .unwrap();

        assert_eq!(records.len(), 3);
        assert!(matches!(&records[0], Record::KernelBoundary { id, .. } if id.0 == "0"));
        assert_eq!(
            records[1],
            Record::SectionBoundary {
                name: "Speed Of Light".into()
            }
        );
        assert!(matches!(&records[2], Record::Metric(m) if m.value == "1,215"));
    }

    #[test]
    fn test_same_canonical_section_does_not_reopen() {
        let mut classifier = ready();
        classifier
            .classify(&row(
                2,
                &["0", "k", "GPU Speed Of Light Throughput", "SM Frequency", "hz", "1", "", "", "", "", ""],
            ))
            .unwrap();
        let records = classifier
            .classify(&row(
                3,
                &["0", "k", "SpeedOfLight", "", "", "", "SOLBottleneck", "OPT", "Look at memory.", "", ""],
            ))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert!(matches!(&records[0], Record::Advisory(a) if a.kind == AdvisoryKind::Optimization));
    }

    #[test]
    fn test_unknown_marker_is_structural_error() {
        let mut classifier = ready();
        let err = classifier
            .classify(&row(
                5,
                &["0", "k", "Occupancy", "", "", "", "Rule", "ERR", "text", "", ""],
            ))
            .unwrap_err();
        match err {
            NcuError::Structural { line, kernel, .. } => {
                assert_eq!(line, 5);
                assert_eq!(kernel.as_deref(), Some("k"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_field_count_must_match_header() {
        let mut classifier = ready();
        let err = classifier
            .classify(&row(2, &["0", "k", "Occupancy", "Metric", "%", "1"]))
            .unwrap_err();
        assert!(err.to_string().contains("expected 11 fields"));
    }

    #[test]
    fn test_rows_without_section_still_open_their_kernel() {
        let mut classifier = ready();
        let records = classifier
            .classify(&row(
                2,
                &["0", "k", "", "Test Metric", "unit", "value", "", "", "", "", ""],
            ))
            .unwrap();
        assert_eq!(
            records,
            vec![Record::KernelBoundary {
                id: KernelId("0".into()),
                full_name: "k".into()
            }]
        );
        assert!(matches!(
            classifier.mode(),
            Mode::InTable { kernel: Some(k), section: None, .. } if k.id.0 == "0"
        ));

        let records = classifier
            .classify(&row(
                3,
                &["0", "k", "", "Other Metric", "unit", "value", "", "", "", "", ""],
            ))
            .unwrap();
        assert_eq!(records, vec![Record::Blank]);
    }

    #[test]
    fn test_speedup_requires_both_columns() {
        let mut classifier = ready();
        let records = classifier
            .classify(&row(
                2,
                &["0", "k", "Occupancy", "", "", "", "R", "INF", "Body", "estimated", ""],
            ))
            .unwrap();
        match records.last() {
            Some(Record::Advisory(a)) => assert!(a.speedup.is_none()),
            other => panic!("expected advisory, got {other:?}"),
        }
    }

    #[test]
    fn test_join_soft_breaks() {
        assert_eq!(
            join_soft_breaks("Memory bandwidth is high.\n   Consider coalescing."),
            "Memory bandwidth is high. Consider coalescing."
        );
        assert_eq!(join_soft_breaks("one\r\ntwo\n\nthree"), "one two three");
        assert_eq!(join_soft_breaks("single line"), "single line");
    }
}
