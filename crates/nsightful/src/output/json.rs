//! Structured dump of NCU profiles.
//!
//! Writes the plain kernel -> section -> {metrics, rules} mapping as JSON,
//! and reads it back for re-rendering.

use crate::ncu::schema::{ParsedProfile, ProfileDict};
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Write a profile's structured mapping to a JSON file
///
/// **Public** - main entry point for structured NCU output
///
/// # Arguments
/// * `profile` - Parsed profile to dump
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
///
/// # Example
/// ```ignore
/// let profile = parse_ncu_file("report.csv")?;
/// write_profile_dict(&profile, "report.json")?;
/// ```
pub fn write_profile_dict(
    profile: &ParsedProfile,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing profile mapping to: {}", output_path.display());

    super::validate_path(output_path)?;
    super::ensure_parent(output_path)?;

    let file = File::create(output_path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &profile.to_dict())?;

    info!(
        "Profile mapping written successfully ({} bytes)",
        calculate_file_size(output_path)
    );
    Ok(())
}

/// Read a structured mapping back from a JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_profile_dict(input_path: impl AsRef<Path>) -> Result<ProfileDict, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading profile mapping from: {}", input_path.display());

    let file = File::open(input_path)?;
    let dict: ProfileDict = serde_json::from_reader(BufReader::new(file))?;

    debug!("Profile mapping loaded: {} kernels", dict.len());
    Ok(dict)
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
