use crate::utils::config::{NcuConfig, NsysConfig};
use std::path::PathBuf;

/// Output format of the ncu command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NcuFormat {
    /// Flat Markdown report
    #[default]
    Markdown,
    /// Structured kernel -> section mapping as JSON
    Json,
}

/// Arguments for the ncu command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone, Default)]
pub struct NcuArgs {
    /// Path to the NCU CSV export
    pub input: PathBuf,

    /// Output path (stdout when absent)
    pub output: Option<PathBuf>,

    pub format: NcuFormat,

    pub config: NcuConfig,
}

/// Arguments for the nsys command
#[derive(Debug, Clone, Default)]
pub struct NsysArgs {
    /// Path to the NSYS SQLite export, or `-` for stdin
    pub input: PathBuf,

    /// Output path (defaults to the input path with a `.json` extension)
    pub output: Option<PathBuf>,

    pub config: NsysConfig,

    /// Print a conversion summary to stdout
    pub print_summary: bool,
}

impl NsysArgs {
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }

    /// Where the trace is written; `None` means stdout
    pub fn output_path(&self) -> Option<PathBuf> {
        match (&self.output, self.reads_stdin()) {
            (Some(path), _) if path.as_os_str() == "-" => None,
            (Some(path), _) => Some(path.clone()),
            (None, true) => None,
            (None, false) => Some(self.input.with_extension("json")),
        }
    }
}
