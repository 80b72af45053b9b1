//! Sync command: reconcile the target store against the external table

use clap::Args;
use tracing::{debug, info};

use relsync_core::{IdentityKey, PortKind};
use relsync_engine::{PortFactory, RunStatus, SyncEngine, SyncReport};

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Only sync the relationships of this user (target store id)
    #[arg(long, short)]
    pub user: Option<IdentityKey>,

    /// Report what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the full run report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: SyncArgs, config: CliConfig, verbose: bool) -> CliResult<()> {
    let sync_config = config.sync_config(args.dry_run);
    debug!(config = ?sync_config.redacted(), "Loaded sync configuration");

    let directory = super::connect_directory(&config).await?;
    let factory = PortFactory::new(directory);

    // Mapping errors surface before the external source is contacted.
    let internal = factory.create(PortKind::Internal.as_str(), &sync_config).await?;
    let external = factory.create(PortKind::External.as_str(), &sync_config).await?;

    let report = SyncEngine::new(external, internal)?
        .with_dry_run(args.dry_run)
        .sync(args.user, verbose)
        .await;

    print_report(&report, args.json)?;
    outcome(&report)
}

fn print_report(report: &SyncReport, json: bool) -> CliResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", report.summary());
    for (key, reason) in report.skipped() {
        println!("  skipped {key}: {reason}");
    }
    Ok(())
}

fn outcome(report: &SyncReport) -> CliResult<()> {
    match &report.status {
        RunStatus::Failed {
            code,
            message,
            exit_code,
        } => Err(CliError::RunFailed {
            code: code.clone(),
            message: message.clone(),
            exit_code: *exit_code,
        }),
        RunStatus::Locked => Err(CliError::Locked),
        _ => {
            info!(run_id = %report.run_id, "Sync finished");
            Ok(())
        }
    }
}
