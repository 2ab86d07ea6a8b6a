use nsightful::commands::{execute_ncu, execute_nsys, NcuArgs, NcuFormat, NsysArgs};
use nsightful::nsys::tables::{load_tables, table_exists};
use nsightful::utils::config::{NsysActivity, NsysConfig};
use rusqlite::Connection;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const CSV: &str = "\"ID\",\"Kernel Name\",\"Section Name\",\"Metric Name\",\"Metric Unit\",\"Metric Value\",\"Rule Name\",\"Rule Type\",\"Rule Description\",\"Estimated Speedup Type\",\"Estimated Speedup\"
\"0\",\"saxpy(int, float, float*, float*)\",\"Launch Statistics\",\"Grid Size\",\"\",\"4096\",\"\",\"\",\"\",\"\",\"\"
\"0\",\"saxpy(int, float, float*, float*)\",\"Launch Statistics\",\"\",\"\",\"\",\"LaunchConfiguration\",\"INF\",\"Grid is large enough.\",\"\",\"\"
";

fn write_nsys_fixture(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE StringIds (id INTEGER PRIMARY KEY, value TEXT NOT NULL);
         CREATE TABLE PROCESSES (globalPid INTEGER, pid INTEGER, name TEXT);
         CREATE TABLE NVTX_EVENTS (start INTEGER NOT NULL, end INTEGER, eventType INTEGER NOT NULL,
                                   text TEXT, globalTid INTEGER, textId INTEGER);
         INSERT INTO PROCESSES VALUES (16777216, 1, 'app');
         INSERT INTO NVTX_EVENTS VALUES (0, 50000, 59, 'a', 16777217, NULL);
         INSERT INTO NVTX_EVENTS VALUES (25000, 75000, 59, 'b', 16777217, NULL);",
    )
    .unwrap();
}

#[test]
fn test_execute_ncu_writes_markdown() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("report.csv");
    fs::write(&input, CSV).unwrap();
    let output = dir.path().join("md").join("report.md");

    execute_ncu(NcuArgs {
        input,
        output: Some(output.clone()),
        ..Default::default()
    })
    .unwrap();

    let markdown = fs::read_to_string(output).unwrap();
    assert!(markdown.starts_with("# saxpy\n\n## Launch\n\n"));
    assert!(markdown.contains("| Grid Size |  | 4096 |"));
    assert!(markdown.contains("ℹ️ **INFO**: Grid is large enough.\n"));
}

#[test]
fn test_execute_ncu_writes_json_mapping() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("report.csv");
    fs::write(&input, CSV).unwrap();
    let output = dir.path().join("report.json");

    execute_ncu(NcuArgs {
        input,
        output: Some(output.clone()),
        format: NcuFormat::Json,
        ..Default::default()
    })
    .unwrap();

    let json: Value = serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
    assert_eq!(json["saxpy"]["Launch"]["rules"][0]["type"], "INF");
    assert_eq!(json["saxpy"]["Launch"]["metrics"][0]["value"], "4096");
}

#[test]
fn test_execute_ncu_reports_parse_errors() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    fs::write(&input, "This is not CSV data\n").unwrap();

    let err = execute_ncu(NcuArgs {
        input,
        output: Some(dir.path().join("out.md")),
        ..Default::default()
    })
    .unwrap_err();
    assert!(format!("{:#}", err).contains("Structural parse error at line 1"));
}

#[test]
fn test_execute_nsys_default_output_path() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("trace.sqlite");
    write_nsys_fixture(&input);

    execute_nsys(NsysArgs {
        input: input.clone(),
        config: NsysConfig {
            activities: vec![NsysActivity::NvtxCpu],
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap();

    let json: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("trace.json")).unwrap()).unwrap();
    assert_eq!(json["otherData"]["warnings"]["nesting_violations"], 1);
}

#[test]
fn test_execute_nsys_enforces_max_warnings() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("trace.sqlite");
    write_nsys_fixture(&input);

    let err = execute_nsys(NsysArgs {
        input,
        output: Some(dir.path().join("out.json")),
        config: NsysConfig {
            activities: vec![NsysActivity::NvtxCpu],
            max_warnings: Some(0),
            ..Default::default()
        },
        print_summary: false,
    })
    .unwrap_err();

    assert!(err.to_string().contains("more than the allowed 0"));
    // The trace is still written before the limit is checked
    assert!(dir.path().join("out.json").exists());
}

#[test]
fn test_fixture_tables_load_read_only() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("trace.sqlite");
    write_nsys_fixture(&input);

    let conn = Connection::open_with_flags(&input, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .unwrap();
    assert!(table_exists(&conn, "NVTX_EVENTS").unwrap());
    assert!(!table_exists(&conn, "CUPTI_ACTIVITY_KIND_KERNEL").unwrap());

    let tables = load_tables(&conn, &NsysConfig::default()).unwrap();
    assert_eq!(tables.nvtx.map(|rows| rows.len()), Some(2));
    assert!(tables.kernels.is_none());
}
