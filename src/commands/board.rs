//! Board command implementation
//!
//! Prints the effective board description, which is a starting point for
//! writing a board file.

use crate::cli::args::OutputFormat;
use crate::config::{Config, ConfigFile};
use crate::error::{ConfigError, Result};

/// Print the configuration as TOML (or JSON with `--format json`)
pub fn run_board(config: &Config, format: OutputFormat) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(config).map_err(ConfigError::from)?,
        OutputFormat::Table | OutputFormat::Compact => ConfigFile::to_toml(config)?,
    };
    println!("{}", text);
    Ok(())
}
