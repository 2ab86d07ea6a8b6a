//! ncu command implementation.
//!
//! The ncu command:
//! 1. Parses the CSV export into a profile
//! 2. Renders Markdown or the structured mapping
//! 3. Writes the result to a file or stdout

use crate::commands::models::{NcuArgs, NcuFormat};
use crate::ncu::parse_ncu_file;
use crate::output::{render_markdown, write_profile_dict, write_text};
use anyhow::{Context, Result};
use log::{debug, info};
use std::time::Instant;

/// Execute the ncu command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Structural parse errors (with line, kernel and section context)
/// * File read/write errors
pub fn execute_ncu(args: NcuArgs) -> Result<()> {
    let start_time = Instant::now();

    let profile = parse_ncu_file(&args.input)
        .with_context(|| format!("Failed to parse NCU export {}", args.input.display()))?;

    info!(
        "Parsed {} kernels ({} metrics, {} advisories)",
        profile.kernels.len(),
        profile.metric_count(),
        profile.advisory_count()
    );

    match (args.format, &args.output) {
        (NcuFormat::Markdown, Some(path)) => {
            let markdown = render_markdown(&profile, &args.config);
            write_text(&markdown, path).context("Failed to write Markdown report")?;
        }
        (NcuFormat::Markdown, None) => {
            print!("{}", render_markdown(&profile, &args.config));
        }
        (NcuFormat::Json, Some(path)) => {
            write_profile_dict(&profile, path).context("Failed to write profile mapping")?;
        }
        (NcuFormat::Json, None) => {
            let json = serde_json::to_string_pretty(&profile.to_dict())
                .context("Failed to serialize profile mapping")?;
            println!("{}", json);
        }
    }

    debug!("ncu completed in {:.2?}", start_time.elapsed());
    Ok(())
}
