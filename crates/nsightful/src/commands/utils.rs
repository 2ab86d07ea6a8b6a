use crate::utils::config::{config_to_toml, load_config, NsightfulConfig, SCHEMA_VERSION};
use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

/// Load the config file if given, defaults otherwise
pub fn resolve_config(path: Option<&Path>) -> Result<NsightfulConfig> {
    match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            load_config(path).with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => Ok(NsightfulConfig::default()),
    }
}

/// Print the effective configuration as TOML
pub fn display_config(config: &NsightfulConfig) -> Result<()> {
    let text = config_to_toml(config).context("Failed to serialize configuration")?;
    print!("{}", text);
    Ok(())
}

/// Display version information
pub fn display_version() {
    println!("nsightful v{}", env!("CARGO_PKG_VERSION"));
    println!("Profile mapping schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Converts Nsight Compute CSV exports to Markdown and");
    println!("Nsight Systems SQLite exports to Chrome trace JSON.");
}
