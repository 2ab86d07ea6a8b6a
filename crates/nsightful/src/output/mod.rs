//! Output rendering and writers.
//!
//! This module handles:
//! - Markdown rendering of NCU profiles
//! - Structured (JSON) dumps of NCU profiles
//! - Trace Event JSON rendering of NSYS traces
//! - Writing rendered text to disk

pub mod json;
pub mod markdown;
pub mod trace_json;

// Re-export main functions
pub use json::{read_profile_dict, write_profile_dict};
pub use markdown::{render_markdown, render_markdown_dict};
pub use trace_json::render_trace_json;

use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs;
use std::path::Path;

/// Common path validation for output files
pub fn validate_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.exists() && path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Create the parent directory of an output path if it does not exist
pub(crate) fn ensure_parent(path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

/// Write rendered text (Markdown or trace JSON) to a file
///
/// **Public** - used by both pipelines
///
/// # Errors
/// * `OutputError::InvalidPath` - Path is empty, a directory, or its parent cannot be created
/// * `OutputError::WriteFailed` - I/O error during write
pub fn write_text(content: &str, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing output to: {}", output_path.display());

    validate_path(output_path)?;
    ensure_parent(output_path)?;
    fs::write(output_path, content)?;

    info!("Output written successfully ({} bytes)", content.len());
    Ok(())
}
