use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use muster_store::{CatalogStore, PgCatalogStore};
use muster_sync::{HarvestJob, SyncConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "muster")]
#[command(about = "Event catalog harvester")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scheduler: one warm-up pass, then the recurring cron.
    Start,
    /// Run a single harvest pass and exit.
    Sync,
    /// Apply pending database migrations and exit.
    Migrate,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect(config: &SyncConfig) -> Result<PgCatalogStore> {
    let store = PgCatalogStore::connect(&config.database_url)
        .await
        .context("connecting to database")?;
    store.migrate().await.context("running migrations")?;
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => {
            let store: Arc<dyn CatalogStore> = Arc::new(connect(&config).await?);
            let job = HarvestJob::from_config(&config, store)?;
            let _sched = job.start().await?;
            info!("harvester started, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("waiting for shutdown")?;
            info!("shutting down");
        }
        Commands::Sync => {
            let store: Arc<dyn CatalogStore> = Arc::new(connect(&config).await?);
            let job = HarvestJob::from_config(&config, store)?;
            match job.trigger_manually().await {
                Some(summary) => {
                    let totals = summary.totals();
                    println!(
                        "harvest complete: run_id={} new={} updated={} inactive={} errors={}",
                        summary.run_id,
                        totals.new_count,
                        totals.updated_count,
                        totals.inactive_count,
                        totals.errors.len()
                    );
                }
                None => println!("harvest skipped: a pass is already running"),
            }
        }
        Commands::Migrate => {
            connect(&config).await?;
            println!("migrations applied");
        }
    }

    Ok(())
}
