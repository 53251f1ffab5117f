//! Table command implementation

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, TableOutput};
use crate::config::Config;
use crate::error::Result;
use crate::services::Board;

/// Show a clock's frequency/voltage table, marking the current rate
pub fn run_table(node: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let board = Board::from_config(config)?;
    let handle = board.node(node)?;

    let output = TableOutput {
        node: node.to_string(),
        current: board.dvfs().node_status(handle)?.set_freq,
        entries: board.dvfs().freq_volt_table(handle)?.entries().to_vec(),
    };
    print_output(&output, format)?;
    Ok(())
}
