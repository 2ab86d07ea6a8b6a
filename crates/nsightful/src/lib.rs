//! nsightful
//!
//! Converters for NVIDIA Nsight profiler exports:
//! - Nsight Compute CSV to Markdown (and a structured mapping)
//! - Nsight Systems SQLite to Chrome Trace Event JSON

pub mod commands;
pub mod ncu;
pub mod nsys;
pub mod output;
pub mod utils;

// Re-export the pipeline entry points
pub use ncu::{parse_ncu_csv, parse_ncu_file, parse_ncu_lines, parse_ncu_str, ParsedProfile};
pub use nsys::{convert_nsys_file, convert_nsys_reader, TraceModel};
pub use output::{render_markdown, render_markdown_dict, render_trace_json, write_text};
pub use utils::config::{NcuConfig, NsightfulConfig, NsysConfig};
