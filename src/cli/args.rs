//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use crate::domain::Khz;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Voltage and frequency scaling tool for simulated SoC boards
///
/// Scale clocks across coupled voltage rails and bring up secondary cores
/// on a board described in TOML.
#[derive(Parser, Debug)]
#[command(name = "dvfsctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Path to board configuration file
    #[arg(short, long, global = true, env = "DVFSCTL_CONFIG")]
    pub config: Option<String>,

    /// Dry run mode - plan changes without applying them
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show rails, clocks and online cores
    Status,

    /// Show a clock's frequency/voltage table
    Table {
        /// Clock name
        node: String,
    },

    /// Request clock rates
    Scale(ScaleArgs),

    /// Prepare SMP and power on secondary cores
    Boot {
        /// Cores to power on
        #[arg(required = true)]
        cpus: Vec<u32>,

        /// Core that stays up during preparation
        #[arg(long)]
        boot_cpu: Option<u32>,
    },

    /// Print the effective board description as TOML
    Board,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the scale command
#[derive(Parser, Debug)]
pub struct ScaleArgs {
    /// Rate requests, applied in order (format: NODE:KHZ, e.g., cpu:1200000)
    #[arg(value_name = "NODE:KHZ", required = true, value_parser = parse_rate_request)]
    pub requests: Vec<RateRequest>,

    /// Install a rate clamp before scaling (format: NODE=MIN:MAX in kHz)
    #[arg(long = "limit", value_name = "NODE=MIN:MAX", value_parser = parse_limit)]
    pub limits: Vec<LimitArg>,

    /// Freeze scaling on a clock before the requests run
    #[arg(long = "disable", value_name = "NODE")]
    pub disabled: Vec<String>,

    /// Power off a power domain before the requests run
    #[arg(long = "power-off", value_name = "PD")]
    pub powered_off: Vec<String>,

    /// Print every simulated regulator and clock change
    #[arg(long)]
    pub trace: bool,
}

/// One `NODE:KHZ` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRequest {
    pub node: String,
    pub rate: Khz,
}

/// One `NODE=MIN:MAX` clamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitArg {
    pub node: String,
    pub min: Khz,
    pub max: Khz,
}

fn parse_khz(s: &str) -> Result<Khz, String> {
    s.trim()
        .parse::<u32>()
        .map(Khz::new)
        .map_err(|_| format!("invalid rate '{}': expected kHz", s))
}

/// Parse `NODE:KHZ`
pub fn parse_rate_request(s: &str) -> Result<RateRequest, String> {
    let (node, rate) = s
        .split_once(':')
        .ok_or_else(|| format!("invalid request '{}': expected NODE:KHZ", s))?;
    if node.is_empty() {
        return Err(format!("invalid request '{}': missing node", s));
    }
    Ok(RateRequest {
        node: node.to_string(),
        rate: parse_khz(rate)?,
    })
}

/// Parse `NODE=MIN:MAX`
pub fn parse_limit(s: &str) -> Result<LimitArg, String> {
    let (node, range) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid limit '{}': expected NODE=MIN:MAX", s))?;
    let (min, max) = range
        .split_once(':')
        .ok_or_else(|| format!("invalid limit '{}': expected NODE=MIN:MAX", s))?;
    Ok(LimitArg {
        node: node.to_string(),
        min: parse_khz(min)?,
        max: parse_khz(max)?,
    })
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for machine parsing
    Json,
    /// Compact single-line format
    Compact,
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
