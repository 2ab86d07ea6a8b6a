//! nsys command implementation.
//!
//! The nsys command:
//! 1. Opens the SQLite export (or spools stdin)
//! 2. Normalizes and assembles the trace
//! 3. Renders Trace Event JSON
//! 4. Writes the output and reports conversion warnings

use crate::commands::models::NsysArgs;
use crate::nsys::{convert_nsys_file, convert_nsys_reader, TraceModel};
use crate::output::{render_trace_json, write_text};
use anyhow::{bail, Context, Result};
use colored::*;
use log::{debug, info, warn};
use std::io;
use std::time::Instant;

/// Execute the nsys command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Unsupported or unreadable export
/// * File write errors
/// * More warnings than `max_warnings` allows
pub fn execute_nsys(args: NsysArgs) -> Result<()> {
    let start_time = Instant::now();
    let config = &args.config;

    let model = if args.reads_stdin() {
        convert_nsys_reader(io::stdin().lock(), config)
            .context("Failed to convert NSYS export from stdin")?
    } else {
        convert_nsys_file(&args.input, config)
            .with_context(|| format!("Failed to convert NSYS export {}", args.input.display()))?
    };

    let json = render_trace_json(&model, config).context("Failed to render trace JSON")?;

    match args.output_path() {
        Some(path) => {
            write_text(&json, &path).context("Failed to write trace JSON")?;
            info!("Trace written to {}", path.display());
        }
        None => println!("{}", json),
    }

    let warnings = model.warnings.total();
    if warnings > 0 {
        warn!("Conversion finished with {} warnings", warnings);
    }

    if args.print_summary {
        println!("{}", format_warning_summary(&model));
    }

    debug!("nsys completed in {:.2?}", start_time.elapsed());

    if let Some(limit) = config.max_warnings {
        if warnings > limit {
            bail!(
                "Conversion produced {} warnings, more than the allowed {}",
                warnings,
                limit
            );
        }
    }

    Ok(())
}

/// Human-readable summary of a conversion
///
/// **Public** - printed by the CLI with `--summary`
pub fn format_warning_summary(model: &TraceModel) -> String {
    let mut out = String::new();

    out.push_str(&"Trace Conversion Summary".bold().to_string());
    out.push('\n');
    out.push_str(&format!(
        "  Events: {}  Processes: {}  Threads: {}\n",
        model.events.len(),
        model.processes.len(),
        model.threads.len()
    ));

    for (category, count) in model.category_counts() {
        out.push_str(&format!("    {:<12} {}\n", category, count));
    }

    let warnings = &model.warnings;
    if warnings.is_empty() {
        out.push_str(&format!("  {}\n", "No warnings".green()));
        return out;
    }

    out.push_str(&format!(
        "  {}\n",
        format!("{} warnings", warnings.total()).yellow().bold()
    ));
    for warning in &warnings.unresolved_references {
        out.push_str(&format!("    {} {}\n", "ref".yellow(), warning));
    }
    for violation in &warnings.nesting_violations {
        out.push_str(&format!("    {} {}\n", "nest".red(), violation));
    }

    out
}
