//! Boot command implementation
//!
//! Powers off every core except the boot core, then powers the requested
//! secondary cores on one at a time.

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, BootReport, Message};
use crate::config::Config;
use crate::error::Result;
use crate::services::Board;

/// Execute the boot command
pub fn run_boot(cpus: &[u32], config: &Config, format: OutputFormat, dry_run: bool) -> Result<()> {
    let mut board = Board::from_config(config)?;

    if dry_run {
        let message = Message {
            message: format!(
                "[DRY RUN] Would keep cpu{} up and power on {:?}",
                board.boot_cpu(),
                cpus
            ),
            success: true,
        };
        print_output(&message, format)?;
        return Ok(());
    }

    print_output(&boot(&mut board, cpus)?, format)?;
    Ok(())
}

/// Prepare SMP and boot `cpus`
pub fn boot(board: &mut Board, cpus: &[u32]) -> Result<BootReport> {
    let boot_cpu = board.boot_cpu();
    board.smp_mut().prepare_cpus(boot_cpu)?;

    let mut booted = Vec::new();
    for &cpu in cpus.iter().filter(|c| **c != boot_cpu) {
        board.smp_mut().boot_secondary(cpu)?;
        booted.push(cpu);
    }

    Ok(BootReport {
        boot_cpu,
        booted,
        online_cpus: board.smp().online_cpus()?,
    })
}
