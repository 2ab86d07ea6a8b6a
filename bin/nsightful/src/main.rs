//! nsightful CLI
//!
//! Converts Nsight Compute CSV exports to Markdown and Nsight Systems
//! SQLite exports to Chrome trace JSON.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::debug;
use std::path::PathBuf;

use nsightful::commands::{
    display_config, display_version, execute_ncu, execute_nsys, resolve_config, NcuArgs,
    NcuFormat, NsysArgs,
};
use nsightful::utils::config::{
    IntervalEncoding, NsightfulConfig, NsysActivity, SectionOrder, TimeUnit, TraceLayout,
};

/// nsightful - Nsight profiler export converters
#[derive(Parser, Debug)]
#[command(name = "nsightful")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "NSIGHTFUL_CONFIG")]
    config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert an Nsight Compute CSV export to Markdown
    Ncu {
        /// Path to the CSV export
        input: PathBuf,

        /// Output path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the structured kernel/section mapping as JSON instead of Markdown
        #[arg(long)]
        json: bool,

        /// Render well-known sections in canonical order
        #[arg(long)]
        canonical_order: bool,
    },

    /// Convert an Nsight Systems SQLite export to Chrome trace JSON
    Nsys {
        /// Path to the SQLite export, or - for stdin
        input: PathBuf,

        /// Output path (defaults to the input with a .json extension, - for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Activity types to include (kernel, nvtx, nvtx-kernel, cuda-api)
        #[arg(short, long, value_delimiter = ',')]
        activities: Vec<NsysActivity>,

        /// Keep only NVTX ranges starting with one of these prefixes
        #[arg(long, value_delimiter = ',')]
        event_prefix: Vec<String>,

        /// Write begin/end pairs instead of complete events
        #[arg(long)]
        begin_end: bool,

        /// Display times in nanoseconds (timestamps stay in microseconds)
        #[arg(long)]
        nanoseconds: bool,

        /// Write a bare event array instead of a trace object
        #[arg(long)]
        array: bool,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,

        /// Fail when more warnings than this are produced
        #[arg(long)]
        max_warnings: Option<usize>,

        /// Print a conversion summary
        #[arg(long)]
        summary: bool,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let config: NsightfulConfig = resolve_config(cli.config.as_deref())?;
    debug!("Effective configuration: {:?}", config);

    // Execute command
    match cli.command {
        Commands::Ncu {
            input,
            output,
            json,
            canonical_order,
        } => {
            let mut ncu_config = config.ncu;
            if canonical_order {
                ncu_config.section_order = SectionOrder::Canonical;
            }

            execute_ncu(NcuArgs {
                input,
                output,
                format: if json {
                    NcuFormat::Json
                } else {
                    NcuFormat::Markdown
                },
                config: ncu_config,
            })?;
        }

        Commands::Nsys {
            input,
            output,
            activities,
            event_prefix,
            begin_end,
            nanoseconds,
            array,
            pretty,
            max_warnings,
            summary,
        } => {
            // Flags override the config file
            let mut nsys_config = config.nsys;
            if !activities.is_empty() {
                nsys_config.activities = activities;
            }
            if !event_prefix.is_empty() {
                nsys_config.event_prefix = event_prefix;
            }
            if begin_end {
                nsys_config.interval_encoding = IntervalEncoding::BeginEnd;
            }
            if nanoseconds {
                nsys_config.time_unit = TimeUnit::Nanoseconds;
            }
            if array {
                nsys_config.layout = TraceLayout::Array;
            }
            if pretty {
                nsys_config.pretty = true;
            }
            if max_warnings.is_some() {
                nsys_config.max_warnings = max_warnings;
            }

            execute_nsys(NsysArgs {
                input,
                output,
                config: nsys_config,
                print_summary: summary,
            })?;
        }

        Commands::Config => {
            display_config(&config)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
