use anyhow::{Context, Result};
use homelink::api::{create_emulator_router, create_router, AppState};
use homelink::config::{self, StoreBackend};
use homelink::credentials::{self, MISSING_CREDENTIALS};
use homelink::store::{MemoryStore, RealtimeStore, RestStore, UnavailableStore};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "homelink=info".into()),
        )
        .init();

    info!("Homelink API starting...");

    let config = config::load().context("Failed to load configuration")?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    let router = match config.store.backend {
        StoreBackend::Memory => {
            let memory = Arc::new(MemoryStore::new());
            info!("Using in-memory store, emulator mounted at /store");
            create_router(AppState::new(memory.clone())).merge(create_emulator_router(memory))
        }
        StoreBackend::Emulator | StoreBackend::Firebase => {
            let store = connect_store(&config.store)?;
            create_router(AppState::new(store))
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Homelink API stopped");

    Ok(())
}

/// REST-backed store, or a store that fails every request when the hosted
/// database has no credentials.
fn connect_store(config: &config::StoreConfig) -> Result<Arc<dyn RealtimeStore>> {
    let creds = credentials::load_from_env().context("Failed to load store credentials")?;

    if config.backend == StoreBackend::Firebase && creds.is_none() {
        error!("{}", MISSING_CREDENTIALS);
        return Ok(Arc::new(UnavailableStore::new(MISSING_CREDENTIALS)));
    }

    let store = RestStore::from_config(config, creds)?;
    info!(url = %store.base_url(), "Using remote realtime store");
    Ok(Arc::new(store))
}
