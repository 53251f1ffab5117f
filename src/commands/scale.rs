//! Scale command implementation
//!
//! Applies rate requests to the simulated board in order, or plans them
//! with `--dry-run`.

use crate::cli::args::{OutputFormat, ScaleArgs};
use crate::cli::output::{print_output, ScaleReport, ScaleStep};
use crate::config::Config;
use crate::dvfs::{DomainStatus, Dvfs};
use crate::error::{AppError, ConfigError, DvfsError, Result};
use crate::services::Board;

/// Execute the scale command
pub fn run_scale(args: &ScaleArgs, config: &Config, format: OutputFormat, dry_run: bool) -> Result<()> {
    let board = Board::from_config(config)?;
    let (report, first_error) = scale(&board, args, dry_run)?;

    print_output(&report, format)?;
    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Prepare node policy, then run every request
///
/// Request failures are reported per step; the first one is also returned
/// so the command exits non-zero.
pub fn scale(
    board: &Board,
    args: &ScaleArgs,
    dry_run: bool,
) -> Result<(ScaleReport, Option<DvfsError>)> {
    let dvfs = board.dvfs();

    for limit in &args.limits {
        dvfs.enable_limit(board.node(&limit.node)?, limit.min, limit.max)?;
    }
    for name in &args.disabled {
        dvfs.disable_dvfs(board.node(name)?)?;
    }
    for name in &args.powered_off {
        let pd = dvfs
            .find_power_domain_by_name(name)
            .ok_or_else(|| ConfigError::UnknownReference {
                kind: "power domain",
                name: name.clone(),
            })?;
        dvfs.set_power_domain_status(pd, false)?;
    }

    let mut steps = Vec::with_capacity(args.requests.len());
    let mut first_error = None;
    for request in &args.requests {
        let node = board.node(&request.node)?;
        let mut step = ScaleStep {
            node: request.node.clone(),
            requested: request.rate,
            plan: None,
            status: None,
            error: None,
        };

        let outcome = if dry_run {
            dvfs.plan_rate(node, request.rate).map(|plan| {
                log::info!("DRY RUN: {} -> {}", request.node, request.rate);
                step.plan = Some(plan);
            })
        } else {
            dvfs.request_rate(node, request.rate)
        };

        if let Err(e) = outcome {
            log::warn!("{} -> {}: {}", request.node, request.rate, e);
            step.error = Some(e.to_string());
            first_error.get_or_insert(e);
        }
        if !dry_run {
            step.status = Some(dvfs.node_status(node)?);
        }
        steps.push(step);
    }

    let report = ScaleReport {
        dry_run,
        steps,
        domains: domain_statuses(dvfs)?,
        trace: if args.trace {
            board.trace().take()
        } else {
            Vec::new()
        },
    };
    Ok((report, first_error))
}

fn domain_statuses(dvfs: &Dvfs) -> Result<Vec<DomainStatus>> {
    dvfs.voltage_domains()
        .iter()
        .map(|vd| dvfs.domain_status(vd.handle()).map_err(AppError::from))
        .collect()
}
