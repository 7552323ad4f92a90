use anyhow::{anyhow, Context, Result};
use homelink::config::{self, StoreBackend, StoreConfig};
use homelink::credentials::{self, MISSING_CREDENTIALS};
use homelink::store::{MemoryStore, RealtimeStore, RestStore};
use std::sync::Arc;
use tracing::info;
use virtual_device::Simulator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "virtual_device=info,homelink=info".into()),
        )
        .init();

    info!("Virtual device simulator starting...");

    let config = config::load().context("Failed to load configuration")?;
    let store = connect_store(&config.store)?;

    let running = Simulator::new(store).start(&config.simulator).await?;
    info!("Virtual device is running. Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutting down virtual device...");
    running.shutdown();

    Ok(())
}

fn connect_store(config: &StoreConfig) -> Result<Arc<dyn RealtimeStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-process memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Emulator | StoreBackend::Firebase => {
            let creds = credentials::load_from_env().context("Failed to load store credentials")?;
            if config.backend == StoreBackend::Firebase && creds.is_none() {
                return Err(anyhow!(MISSING_CREDENTIALS));
            }
            let store = RestStore::from_config(config, creds)?;
            info!(url = %store.base_url(), "Using remote realtime store");
            Ok(Arc::new(store))
        }
    }
}
