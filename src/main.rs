//! Registry transfer service
//!
//! Loads `config/<env>.yaml`, opens the transfer store and runs the
//! auto-approval scheduler until interrupted.
//!
//! ```text
//! registry_transfer [--env <name>]
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use registry_transfer::clock::SystemClock;
use registry_transfer::config::AppConfig;
use registry_transfer::logging::init_logging;
use registry_transfer::transfer::{
    AutoApprovalScheduler, MemoryTransferStore, PgTransferStore, ResourceAuthInfoVerifier,
    TransferFlow, TransferStore,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TransferStore>> {
    match &config.postgres_url {
        Some(url) => {
            let store = PgTransferStore::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            store
                .init_schema()
                .await
                .context("Failed to initialize transfer schema")?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("No postgres_url configured, using in-memory store");
            Ok(Arc::new(MemoryTransferStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config);

    info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        automatic_transfer_days = config.transfer.automatic_transfer_days,
        "Registry transfer service starting"
    );

    let store = open_store(&config).await?;
    let flow = Arc::new(TransferFlow::new(
        store,
        Arc::new(SystemClock),
        Arc::new(ResourceAuthInfoVerifier),
        config.transfer.clone(),
        config.flow.clone(),
    ));
    let scheduler = Arc::new(AutoApprovalScheduler::new(flow, config.scheduler.clone()));

    let worker = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler.run().await;
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    worker.abort();

    Ok(())
}
