use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use gridscope_cli::{config::load_config, Cli, Commands};
use gridscope_core::{GridError, PersistenceError};
use tracing::{debug, error};
use tracing_subscriber::FmtSubscriber;

mod commands;

/// Taxonomy label of a fatal error, for the log line.
fn category(err: &anyhow::Error) -> &'static str {
    if let Some(grid) = err.downcast_ref::<GridError>() {
        return grid.category();
    }
    if err.downcast_ref::<PersistenceError>().is_some() {
        return "persistence";
    }
    "cli"
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    debug!("Loaded configuration from {}", cli.config.display());

    match &cli.command {
        Commands::Run { place } => commands::run::handle(&config, &cli.config, place.as_deref()),
        Commands::Territories { place, out } => {
            commands::territories::handle(&config, place.as_deref(), out)
        }
        Commands::Show { territory, format } => {
            commands::show::handle(&config, territory.as_deref(), *format)
        }
        Commands::Status => commands::status::handle(&config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries command output only
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[{}] {:#}", category(&e), e);
            ExitCode::FAILURE
        }
    }
}
