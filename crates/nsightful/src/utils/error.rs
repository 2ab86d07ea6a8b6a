//! Error types for the entire library.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in the commands and main.rs.

use thiserror::Error;

/// Errors that can occur while parsing an Nsight Compute CSV export
#[derive(Error, Debug)]
pub enum NcuError {
    /// A logical row violates the expected grammar. Fatal for the whole parse.
    #[error(
        "Structural parse error at line {line}: {message} ({})",
        describe_position(.kernel, .section)
    )]
    Structural {
        line: u64,
        kernel: Option<String>,
        section: Option<String>,
        message: String,
    },

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_position(kernel: &Option<String>, section: &Option<String>) -> String {
    match (kernel, section) {
        (Some(k), Some(s)) => format!("kernel '{}', section '{}'", k, s),
        (Some(k), None) => format!("kernel '{}', no open section", k),
        _ => "before any kernel".to_string(),
    }
}

/// Errors that can occur while converting an Nsight Systems SQLite export
#[derive(Error, Debug)]
pub enum NsysError {
    /// A required table is structurally absent. Fatal, no partial model.
    #[error("Unsupported schema: {0}")]
    UnsupportedSchema(String),

    #[error("SQLite query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur while loading or printing configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
