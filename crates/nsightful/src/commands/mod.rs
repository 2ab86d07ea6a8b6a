//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the library components and own all terminal output.

pub mod models;
pub mod ncu;
pub mod nsys;
pub mod utils;

// Re-export main command functions
pub use models::{NcuArgs, NcuFormat, NsysArgs};
pub use ncu::execute_ncu;
pub use nsys::{execute_nsys, format_warning_summary};
pub use utils::{display_config, display_version, resolve_config};
