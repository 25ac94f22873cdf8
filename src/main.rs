use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod output;

use config::Config;

/// Bagslice - cut recorded message logs down by channel and time window
#[derive(Parser, Debug)]
#[command(name = "bagslice")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ./bagslice.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the channels and time bounds of a bag
    Info(commands::info::InfoArgs),

    /// Copy selected channels within a time window into a new bag
    Filter(commands::filter::FilterArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Filter(args) => commands::filter::run(args, config).await,
    }
}
