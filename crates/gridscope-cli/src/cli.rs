use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Substation service territories and market profiles", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Configuration file
    #[arg(long, global = true, default_value = "gridscope.toml", value_hint = ValueHint::FilePath)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Regenerate territories and profiles and publish them to the store
    Run {
        /// Place to fetch the boundary for (overrides `place` in the config)
        #[arg(long)]
        place: Option<String>,
    },
    /// Build territories only and write them as GeoJSON; the store is untouched
    Territories {
        #[arg(long)]
        place: Option<String>,
        /// Output GeoJSON file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
    },
    /// Print the published profiles
    Show {
        /// Only this territory
        #[arg(long)]
        territory: Option<String>,
        #[arg(long, value_enum, default_value_t = ShowFormat::Table)]
        format: ShowFormat,
    },
    /// Published run id, age and freshness
    Status,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShowFormat {
    Table,
    Json,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
