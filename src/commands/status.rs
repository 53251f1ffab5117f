//! Status command implementation

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, BoardStatus};
use crate::config::Config;
use crate::error::Result;
use crate::services::Board;

/// Show rails, clocks and online cores
pub fn run_status(config: &Config, format: OutputFormat) -> Result<()> {
    let board = Board::from_config(config)?;
    print_output(&collect_status(&board)?, format)?;
    Ok(())
}

/// Snapshot every rail and clock on the board
pub fn collect_status(board: &Board) -> Result<BoardStatus> {
    let dvfs = board.dvfs();

    let domains = dvfs
        .voltage_domains()
        .iter()
        .map(|vd| dvfs.domain_status(vd.handle()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let clocks = dvfs
        .clock_nodes()
        .iter()
        .map(|node| dvfs.node_status(node.handle()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(BoardStatus {
        domains,
        clocks,
        cores: board.smp().settings().cores,
        online_cpus: board.smp().online_cpus()?,
    })
}
