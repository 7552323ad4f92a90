use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default config file looked up when `HOMELINK_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "homelink.toml";

/// Complete homelink configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// HTTP API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which realtime store to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process tree (the API server also exposes it under `/store`)
    #[default]
    Memory,
    /// Local emulator surface of another homelink server, no auth
    Emulator,
    /// Hosted realtime database, credentials required
    Firebase,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "emulator" => Ok(StoreBackend::Emulator),
            "firebase" => Ok(StoreBackend::Firebase),
            other => anyhow::bail!("Unknown store backend '{}'", other),
        }
    }
}

/// Realtime store configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database base URL; defaults depend on the backend
    #[serde(default)]
    pub database_url: Option<String>,
}

/// Emulator surface served by a local homelink API server
pub const DEFAULT_EMULATOR_URL: &str = "http://localhost:3000/store";

impl StoreConfig {
    /// URL for the emulator backend
    pub fn emulator_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| DEFAULT_EMULATOR_URL.to_string())
    }
}

/// Virtual device simulator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// WebSocket feed port
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    /// Monitor page port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_sensor_interval")]
    pub sensor_interval_seconds: u64,
    #[serde(default = "default_status_interval")]
    pub status_interval_seconds: u64,
    /// Static HTML served by the monitor
    #[serde(default = "default_monitor_page")]
    pub monitor_page: PathBuf,
}

fn default_ws_port() -> u16 {
    8765
}

fn default_http_port() -> u16 {
    8080
}

fn default_sensor_interval() -> u64 {
    10
}

fn default_status_interval() -> u64 {
    30
}

fn default_monitor_page() -> PathBuf {
    PathBuf::from("virtual-device/static/web-interface.html")
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ws_port: default_ws_port(),
            http_port: default_http_port(),
            sensor_interval_seconds: default_sensor_interval(),
            status_interval_seconds: default_status_interval(),
            monitor_page: default_monitor_page(),
        }
    }
}

impl SimulatorConfig {
    /// Reject settings the timers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sensor_interval_seconds == 0 {
            anyhow::bail!("simulator.sensor_interval_seconds must be greater than zero");
        }
        if self.status_interval_seconds == 0 {
            anyhow::bail!("simulator.status_interval_seconds must be greater than zero");
        }
        Ok(())
    }
}

impl HomeConfig {
    pub fn validate(&self) -> Result<()> {
        self.simulator.validate()
    }

    /// Apply `HOMELINK_PORT`, `HOMELINK_STORE_BACKEND` and `FIREBASE_DATABASE_URL`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HOMELINK_PORT") {
            self.server.port = v
                .parse()
                .context("HOMELINK_PORT must be a valid port number")?;
        }
        if let Some(v) = lookup("HOMELINK_STORE_BACKEND") {
            self.store.backend = v.parse()?;
        }
        if let Some(v) = lookup("FIREBASE_DATABASE_URL") {
            if !v.trim().is_empty() {
                self.store.database_url = Some(v);
            }
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<HomeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: HomeConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

/// Load configuration the way the binaries do: `HOMELINK_CONFIG` (or
/// `homelink.toml` when present), then environment overrides.
pub fn load() -> Result<HomeConfig> {
    let explicit = std::env::var("HOMELINK_CONFIG").ok();
    let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_FILE));

    let mut config = if explicit.is_some() || path.exists() {
        info!(path = %path.display(), "Loading configuration");
        load_config(&path)?
    } else {
        HomeConfig::default()
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
