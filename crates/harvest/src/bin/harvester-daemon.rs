//! harvester-daemon — periodic harvest scheduler service.
//!
//! Loads collaborator endpoints from the environment, then sweeps the
//! enabled harvest configs on a fixed tick, dispatching a cycle for
//! every config whose schedule is due.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bibharvest::{ContextHarvestExecutor, HarvestScheduler, HarvesterContext};
use bibharvest_core::{config::load_dotenv, Config};

/// Periodic harvester daemon.
#[derive(Parser, Debug)]
#[command(name = "harvester-daemon", version, about)]
struct Cli {
    /// Tracing filter directive (e.g. "info", "bibharvest=debug").
    #[arg(long, env = "HARVEST_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.log))
        .init();

    let config = Config::from_env();
    config.log_summary();

    let ctx = Arc::new(HarvesterContext::from_config(&config)?);
    let scheduler = HarvestScheduler::new(
        ctx.config_store.clone(),
        Arc::new(ContextHarvestExecutor::new(ctx.clone())),
        &config.scheduler,
    );
    scheduler.run().await;
    Ok(())
}
