//! relsync - Sync role relationships from an external table into the
//! directory
//!
//! Commands:
//! - `sync`: reconcile every relationship, or one user's with `--user`
//! - `fields`: list the field selectors usable in the `[local]` mapping
//!
//! Exit codes: 0 on success or nothing to do, 1 on configuration or
//! connection errors, 2 when a read fails mid-run, 3 when another run
//! holds the lock.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;
mod logging;

use config::{CliConfig, DEFAULT_CONFIG_PATH};
use error::CliResult;

/// relsync - Role relationship sync
#[derive(Parser, Debug)]
#[command(name = "relsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, global = true, env = "RELSYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log progress in more detail
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile target store relationships with the external table
    Sync(commands::sync::SyncArgs),

    /// List the mappable identity fields
    Fields(commands::fields::FieldsArgs),
}

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = CliConfig::load(&cli.config)?;

    match cli.command {
        Commands::Sync(args) => commands::sync::execute(args, config, cli.verbose).await,
        Commands::Fields(args) => commands::fields::execute(args, config).await,
    }
}
