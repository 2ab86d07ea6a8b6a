//! Nsight Systems SQLite conversion.
//!
//! This module handles:
//! - Loading the relevant tables from an export (read-only)
//! - Normalizing rows into uniform event descriptors
//! - Assembling descriptors into an ordered, validated trace model

pub mod assembler;
pub mod normalizer;
pub mod schema;
pub mod tables;

// Re-export main types
pub use assembler::assemble;
pub use normalizer::{normalize, EventDescriptor, NormalizedTrace};
pub use schema::{
    ArgValue, Args, ConversionWarnings, EventRef, NestingViolation, Phase, ReferenceKind,
    ReferenceResolutionWarning, TraceEvent, TraceModel, Track,
};
pub use tables::{load_tables, RawTables};

use crate::utils::config::NsysConfig;
use crate::utils::error::NsysError;
use log::{debug, info};
use rusqlite::{Connection, OpenFlags};
use std::io::{self, Read};
use std::path::Path;

/// Convert an open export database into a trace model
///
/// The database is only read.
pub fn convert_nsys_connection(
    conn: &Connection,
    config: &NsysConfig,
) -> Result<TraceModel, NsysError> {
    let tables = load_tables(conn, config)?;
    convert_nsys_tables(&tables, config)
}

/// Convert already loaded rows into a trace model
pub fn convert_nsys_tables(tables: &RawTables, config: &NsysConfig) -> Result<TraceModel, NsysError> {
    let normalized = normalize(tables, config)?;
    let model = assemble(normalized, config);
    debug!(
        "Trace model: {} events, {} processes, {} threads, {} warnings",
        model.events.len(),
        model.processes.len(),
        model.threads.len(),
        model.warnings.total()
    );
    Ok(model)
}

/// Convert an export file into a trace model
///
/// **Public** - main entry point for the NSYS pipeline
///
/// # Errors
/// * `NsysError::Sqlite` - The file is not a readable SQLite database
/// * `NsysError::UnsupportedSchema` - No usable event table for the selected activities
///
/// # Example
/// ```ignore
/// let model = convert_nsys_file("report.sqlite", &NsysConfig::default())?;
/// let json = render_trace_json(&model, &NsysConfig::default())?;
/// ```
pub fn convert_nsys_file(
    path: impl AsRef<Path>,
    config: &NsysConfig,
) -> Result<TraceModel, NsysError> {
    let path = path.as_ref();
    info!("Reading NSYS export: {}", path.display());

    if !path.is_file() {
        return Err(NsysError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such export file: {}", path.display()),
        )));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    convert_nsys_connection(&conn, config)
}

/// Convert an export read from a stream into a trace model
///
/// SQLite needs random access, so the stream is spooled to a temporary
/// file that is removed once the conversion finishes.
pub fn convert_nsys_reader<R: Read>(mut reader: R, config: &NsysConfig) -> Result<TraceModel, NsysError> {
    let mut spool = tempfile::NamedTempFile::new()?;
    let bytes = io::copy(&mut reader, &mut spool)?;
    debug!("Spooled {} bytes to {}", bytes, spool.path().display());

    convert_nsys_file(spool.path(), config)
}
