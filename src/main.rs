//! dvfsctl - voltage and frequency scaling tool
//!
//! A command-line tool for scaling clocks across coupled voltage rails and
//! bringing up secondary cores on a simulated board.

use clap::Parser;
use dvfsctl::cli::args::{generate_completions, Cli, Commands};
use dvfsctl::commands::{run_board, run_boot, run_scale, run_status, run_table};
use dvfsctl::config::{Config, ConfigBuilder};
use dvfsctl::error::{AppError, ConfigError, DvfsError};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Set log level based on verbose flag
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli, boot_cpu: Option<u32>) -> Result<Config, AppError> {
    Ok(ConfigBuilder::new()
        .with_file(cli.config.as_deref())?
        .with_verbose(cli.verbose.then_some(true))
        .with_dry_run(cli.dry_run.then_some(true))
        .with_boot_cpu(boot_cpu)
        .build())
}

fn run(cli: &Cli) -> Result<(), AppError> {
    match &cli.command {
        Commands::Completions { shell } => {
            generate_completions(*shell);
            Ok(())
        }

        Commands::Status => run_status(&load_config(cli, None)?, cli.format),

        Commands::Table { node } => run_table(node, &load_config(cli, None)?, cli.format),

        Commands::Scale(args) => {
            let config = load_config(cli, None)?;
            run_scale(args, &config, cli.format, config.general.dry_run)
        }

        Commands::Boot { cpus, boot_cpu } => {
            let config = load_config(cli, *boot_cpu)?;
            run_boot(cpus, &config, cli.format, config.general.dry_run)
        }

        Commands::Board => run_board(&load_config(cli, None)?, cli.format),
    }
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Config(ConfigError::FileNotFound(_)) => {
            eprintln!();
            eprintln!("Hint: Run 'dvfsctl board > dvfsctl.toml' to start from the built-in board.");
        }
        AppError::NodeNotFound(_) => {
            eprintln!();
            eprintln!("Hint: Run 'dvfsctl status' to list the board's clocks.");
        }
        AppError::Dvfs(DvfsError::Domain(_)) => {
            eprintln!();
            eprintln!("Hint: Run 'dvfsctl table <node>' to see the supported rates.");
        }
        _ => {}
    }
}
