//! Virtual device simulator.
//!
//! Stands in for the hardware side of the smart home: it mirrors the known
//! devices from the realtime store, drives simulated GPIO pins when their
//! status changes, writes synthetic sensor readings, and relays everything
//! to local monitor clients.
//!
//! ```text
//!            ┌──────────── RealtimeStore ────────────┐
//!            │ devices/<id>/status        sensors    │
//!            └──────┬───────────────────────▲────────┘
//!                   │ Subscription          │ update (every 10s)
//!             listener.rs              sensors.rs
//!                   │                       │
//!                   ▼                       ▼
//!              DeviceMirror ──────────▶ Feed (broadcast)
//!                                           │
//!                          ws.rs (port 8765) ──▶ monitor page (port 8080)
//! ```

pub mod device;
pub mod feed;
pub mod listener;
pub mod monitor;
pub mod sensors;
pub mod status;
pub mod ws;

pub use device::{DeviceMirror, DeviceTransition, VirtualDevice};
pub use feed::{Feed, FeedMessage};

use anyhow::{Context, Result};
use homelink::config::SimulatorConfig;
use homelink::home::{initialize_store, MonotonicClock, SensorReading};
use homelink::store::RealtimeStore;
use sensors::{SensorGauge, SensorRelay};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};
use ws::WsState;

/// Shared state of one simulator process.
pub struct Simulator {
    pub store: Arc<dyn RealtimeStore>,
    pub clock: Arc<MonotonicClock>,
    pub mirror: Arc<DeviceMirror>,
    pub gauge: Arc<SensorGauge>,
    pub feed: Arc<Feed>,
}

/// A started simulator: bound addresses and its background tasks.
pub struct RunningSimulator {
    pub ws_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub feed: Arc<Feed>,
    pub mirror: Arc<DeviceMirror>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningSimulator {
    /// Stop every task without draining.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

impl Simulator {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self {
            store,
            clock: Arc::new(MonotonicClock::new()),
            mirror: Arc::new(DeviceMirror::with_defaults()),
            gauge: Arc::new(SensorGauge::new()),
            feed: Arc::new(Feed::new()),
        }
    }

    /// Seed the store and announce the device list to feed clients.
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing store...");
        let (_, sensors) = initialize_store(self.store.as_ref(), &self.clock).await?;

        self.mirror.reset();
        self.gauge.record(SensorReading {
            temperature: sensors.temperature,
            humidity: sensors.humidity,
        });
        info!("Store initialized");

        self.feed.publish(FeedMessage::Init {
            devices: self.mirror.snapshot(),
        });
        Ok(())
    }

    /// Seed, start every loop and bind both servers.
    pub async fn start(self, config: &SimulatorConfig) -> Result<RunningSimulator> {
        config.validate()?;
        self.initialize().await?;

        let mut tasks = listener::spawn_device_listeners(
            Arc::clone(&self.store),
            Arc::clone(&self.mirror),
            Arc::clone(&self.feed),
        );

        let relay = SensorRelay {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            gauge: Arc::clone(&self.gauge),
            feed: Arc::clone(&self.feed),
        };
        tasks.push(tokio::spawn(sensors::run_sensor_updates(
            relay,
            Duration::from_secs(config.sensor_interval_seconds),
        )));

        tasks.push(tokio::spawn(status::run_status_printer(
            Arc::clone(&self.mirror),
            Arc::clone(&self.gauge),
            Duration::from_secs(config.status_interval_seconds),
        )));

        let ws_state = Arc::new(WsState {
            feed: Arc::clone(&self.feed),
            mirror: Arc::clone(&self.mirror),
        });
        let (ws_addr, ws_task) = serve(
            "WebSocket server",
            config.ws_port,
            ws::create_ws_router(ws_state),
        )
        .await?;
        tasks.push(ws_task);

        let (http_addr, http_task) = serve(
            "Web interface",
            config.http_port,
            monitor::create_monitor_router(config.monitor_page.clone()),
        )
        .await?;
        tasks.push(http_task);

        info!(ws = %format!("ws://localhost:{}", ws_addr.port()), "WebSocket server");
        info!(url = %format!("http://localhost:{}", http_addr.port()), "Web monitor");

        Ok(RunningSimulator {
            ws_addr,
            http_addr,
            feed: self.feed,
            mirror: self.mirror,
            tasks,
        })
    }
}

async fn serve(name: &'static str, port: u16, router: axum::Router) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind {} port {}", name, port))?;
    let addr = listener.local_addr()?;

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "{} error", name);
        }
    });
    Ok((addr, task))
}
