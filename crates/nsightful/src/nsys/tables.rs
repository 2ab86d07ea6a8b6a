//! Raw rows of an Nsight Systems SQLite export.
//!
//! [`RawTables`] is the boundary between storage and normalization: it
//! can be loaded from a database with [`load_tables`] or built directly.
//! An event table that is `None` was absent from the export; `Some(vec![])`
//! means present but empty.

use crate::utils::config::{
    NsysActivity, NsysConfig, TABLE_KERNELS, TABLE_NVTX, TABLE_PROCESSES, TABLE_RUNTIME,
    TABLE_STRINGS, TABLE_THREAD_NAMES,
};
use crate::utils::error::NsysError;
use log::debug;
use rusqlite::{params, Connection, Row};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringRow {
    pub id: i64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRow {
    pub global_pid: i64,
    pub pid: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadNameRow {
    pub global_tid: i64,
    pub name_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelRow {
    pub start: i64,
    pub end: i64,
    pub device_id: i64,
    pub stream_id: i64,
    pub correlation_id: i64,
    pub global_pid: i64,
    pub short_name: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRow {
    pub start: i64,
    pub end: i64,
    pub global_tid: i64,
    pub correlation_id: i64,
    pub name_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NvtxRow {
    pub start: i64,
    pub end: Option<i64>,
    pub text: Option<String>,
    pub text_id: Option<i64>,
    pub global_tid: Option<i64>,
    pub event_type: i64,
}

/// All rows the normalizer consumes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTables {
    pub strings: Option<Vec<StringRow>>,
    pub processes: Option<Vec<ProcessRow>>,
    pub thread_names: Option<Vec<ThreadNameRow>>,
    pub kernels: Option<Vec<KernelRow>>,
    pub runtime: Option<Vec<RuntimeRow>>,
    pub nvtx: Option<Vec<NvtxRow>>,
}

impl RawTables {
    /// Check that the tables needed for the selected activities exist.
    ///
    /// # Errors
    /// * `NsysError::UnsupportedSchema` - The string table is missing, or
    ///   none of the selected event tables is present
    pub fn check_schema(&self, config: &NsysConfig) -> Result<(), NsysError> {
        if self.strings.is_none() {
            return Err(NsysError::UnsupportedSchema(format!(
                "required table {} is missing",
                TABLE_STRINGS
            )));
        }

        const KERNEL_USERS: &[NsysActivity] = &[NsysActivity::Kernel, NsysActivity::NvtxKernel];
        const RUNTIME_USERS: &[NsysActivity] = &[NsysActivity::CudaApi, NsysActivity::NvtxKernel];
        const NVTX_USERS: &[NsysActivity] = &[NsysActivity::NvtxCpu, NsysActivity::NvtxKernel];

        let mut wanted = Vec::new();
        let mut present = false;
        for (table, table_present, users) in [
            (TABLE_KERNELS, self.kernels.is_some(), KERNEL_USERS),
            (TABLE_RUNTIME, self.runtime.is_some(), RUNTIME_USERS),
            (TABLE_NVTX, self.nvtx.is_some(), NVTX_USERS),
        ] {
            if users.iter().any(|a| config.wants(*a)) {
                wanted.push(table);
                present |= table_present;
            }
        }

        if !present {
            return Err(NsysError::UnsupportedSchema(format!(
                "none of the event tables for the selected activities is present (looked for {})",
                wanted.join(", ")
            )));
        }

        Ok(())
    }

    /// Total number of event rows
    pub fn event_rows(&self) -> usize {
        self.kernels.as_ref().map_or(0, Vec::len)
            + self.runtime.as_ref().map_or(0, Vec::len)
            + self.nvtx.as_ref().map_or(0, Vec::len)
    }
}

/// Load the rows needed for the selected activities
///
/// Tables that are not needed are left as `None` without being queried.
///
/// # Errors
/// * `NsysError::Sqlite` - A present table cannot be queried (e.g. a missing column)
pub fn load_tables(conn: &Connection, config: &NsysConfig) -> Result<RawTables, NsysError> {
    let wants_kernels = config.wants(NsysActivity::Kernel) || config.wants(NsysActivity::NvtxKernel);
    let wants_runtime =
        config.wants(NsysActivity::CudaApi) || config.wants(NsysActivity::NvtxKernel);
    let wants_nvtx = config.wants(NsysActivity::NvtxCpu) || config.wants(NsysActivity::NvtxKernel);

    let tables = RawTables {
        strings: load_if_present(conn, TABLE_STRINGS, true, "SELECT id, value FROM StringIds", |row| {
            Ok(StringRow {
                id: row.get(0)?,
                value: row.get(1)?,
            })
        })?,
        processes: load_if_present(
            conn,
            TABLE_PROCESSES,
            true,
            "SELECT globalPid, pid, name FROM PROCESSES",
            |row| {
                Ok(ProcessRow {
                    global_pid: row.get(0)?,
                    pid: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )?,
        thread_names: load_if_present(
            conn,
            TABLE_THREAD_NAMES,
            true,
            "SELECT globalTid, nameId FROM ThreadNames",
            |row| {
                Ok(ThreadNameRow {
                    global_tid: row.get(0)?,
                    name_id: row.get(1)?,
                })
            },
        )?,
        kernels: load_if_present(
            conn,
            TABLE_KERNELS,
            wants_kernels,
            "SELECT start, end, deviceId, streamId, correlationId, globalPid, shortName \
             FROM CUPTI_ACTIVITY_KIND_KERNEL",
            |row| {
                Ok(KernelRow {
                    start: row.get(0)?,
                    end: row.get(1)?,
                    device_id: row.get(2)?,
                    stream_id: row.get(3)?,
                    correlation_id: row.get(4)?,
                    global_pid: row.get(5)?,
                    short_name: row.get(6)?,
                })
            },
        )?,
        runtime: load_if_present(
            conn,
            TABLE_RUNTIME,
            wants_runtime,
            "SELECT start, end, globalTid, correlationId, nameId FROM CUPTI_ACTIVITY_KIND_RUNTIME",
            |row| {
                Ok(RuntimeRow {
                    start: row.get(0)?,
                    end: row.get(1)?,
                    global_tid: row.get(2)?,
                    correlation_id: row.get(3)?,
                    name_id: row.get(4)?,
                })
            },
        )?,
        nvtx: load_if_present(
            conn,
            TABLE_NVTX,
            wants_nvtx,
            "SELECT start, end, text, textId, globalTid, eventType FROM NVTX_EVENTS",
            |row| {
                Ok(NvtxRow {
                    start: row.get(0)?,
                    end: row.get(1)?,
                    text: row.get(2)?,
                    text_id: row.get(3)?,
                    global_tid: row.get(4)?,
                    event_type: row.get(5)?,
                })
            },
        )?,
    };

    debug!("Loaded {} event rows", tables.event_rows());
    Ok(tables)
}

/// Whether a table exists in the database
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, NsysError> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn load_if_present<T, F>(
    conn: &Connection,
    table: &str,
    wanted: bool,
    sql: &str,
    map: F,
) -> Result<Option<Vec<T>>, NsysError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    if !wanted {
        return Ok(None);
    }
    if !table_exists(conn, table)? {
        debug!("Table {} not present", table);
        return Ok(None);
    }

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?;
    debug!("Table {}: {} rows", table, rows.len());
    Ok(Some(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db(sql: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(sql).unwrap();
        conn
    }

    #[test]
    fn test_missing_event_tables_are_none() {
        let conn = memory_db(
            "CREATE TABLE StringIds (id INTEGER PRIMARY KEY, value TEXT NOT NULL);
             INSERT INTO StringIds VALUES (1, 'kernel_a');",
        );
        let tables = load_tables(&conn, &NsysConfig::default()).unwrap();

        assert_eq!(tables.strings.as_ref().unwrap().len(), 1);
        assert!(tables.kernels.is_none());
        assert!(tables.nvtx.is_none());
        assert!(matches!(
            tables.check_schema(&NsysConfig::default()),
            Err(NsysError::UnsupportedSchema(_))
        ));
    }

    #[test]
    fn test_unselected_tables_are_not_loaded() {
        let conn = memory_db(
            "CREATE TABLE StringIds (id INTEGER PRIMARY KEY, value TEXT NOT NULL);
             CREATE TABLE NVTX_EVENTS (start INTEGER, end INTEGER, text TEXT, textId INTEGER,
                                       globalTid INTEGER, eventType INTEGER);
             INSERT INTO NVTX_EVENTS VALUES (0, 10, 'step', NULL, 16777217, 59);",
        );
        let config = NsysConfig {
            activities: vec![NsysActivity::Kernel],
            ..Default::default()
        };
        let tables = load_tables(&conn, &config).unwrap();

        assert!(tables.nvtx.is_none());
        assert!(tables.check_schema(&config).is_err());
    }

    #[test]
    fn test_nullable_nvtx_columns() {
        let conn = memory_db(
            "CREATE TABLE StringIds (id INTEGER PRIMARY KEY, value TEXT NOT NULL);
             CREATE TABLE NVTX_EVENTS (start INTEGER, end INTEGER, text TEXT, textId INTEGER,
                                       globalTid INTEGER, eventType INTEGER);
             INSERT INTO NVTX_EVENTS VALUES (5, NULL, NULL, 3, NULL, 34);",
        );
        let tables = load_tables(&conn, &NsysConfig::default()).unwrap();
        let row = &tables.nvtx.unwrap()[0];

        assert_eq!(row.end, None);
        assert_eq!(row.text, None);
        assert_eq!(row.text_id, Some(3));
        assert_eq!(row.global_tid, None);
    }
}
