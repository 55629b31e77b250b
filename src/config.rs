//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `hub.toml`.
//!     loads configuration from file or falls back to defaults, then applies
//!     environment overrides (store credentials never need to live on disk).
//!
//! structure:
//!     - ServerConfig:   Where the http surface listens.
//!     - LivenessConfig: Heartbeat timeout and the optional display sweep.
//!     - StoreConfig:    Which reading gateway to build and how to reach it.
//!     - ActivityConfig: Size of the operator-facing activity ring.
//!     - LoggingConfig:  Default log filter when RUST_LOG is not set.
//!
//! environment:
//!     HUB_CONFIG     explicit path to the toml file
//!     STORE_URL      overrides store.url (and selects the rest backend)
//!     STORE_API_KEY  overrides store.api_key
//!     PORT           overrides the port in server.bind
//!
//! ==============================================================================

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HubConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LivenessConfig {
    pub timeout_seconds: u64,
    /// 0 disables the background sweep
    pub sweep_seconds: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self { timeout_seconds: crate::liveness::DEFAULT_TIMEOUT_SECONDS, sweep_seconds: 0 }
    }
}

impl LivenessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Rest,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub table: String,
    pub timeout_ms: u64,
    pub device_id: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            api_key: None,
            table: "sensor_data".to_string(),
            timeout_ms: 3000,
            device_id: None,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActivityConfig {
    pub capacity: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self { capacity: crate::activity::DEFAULT_CAPACITY }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl HubConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: HubConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.liveness.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("liveness.timeout_seconds must be > 0".into()));
        }
        if chrono::Duration::from_std(self.liveness.timeout()).is_err() {
            return Err(ConfigError::Invalid(format!(
                "liveness.timeout_seconds = {} is out of range",
                self.liveness.timeout_seconds
            )));
        }
        if self.store.timeout_ms == 0 {
            return Err(ConfigError::Invalid("store.timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Load with default fallback, then apply the process environment.
    pub fn load_or_default() -> Self {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var("HUB_CONFIG") {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("hub.toml"));
        paths.push(PathBuf::from("..").join("config").join("hub.toml"));

        let mut config = None;
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(loaded) => {
                        tracing::info!(path = %path.display(), "config loaded");
                        config = Some(loaded);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to load config");
                    }
                }
            }
        }

        let mut config = config.unwrap_or_else(|| {
            tracing::warn!("no config file found - using defaults");
            Self::default()
        });
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply `STORE_URL`, `STORE_API_KEY` and `PORT` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("STORE_URL").filter(|v| !v.is_empty()) {
            self.store.url = Some(url);
            self.store.backend = StoreBackend::Rest;
        }
        if let Some(key) = lookup("STORE_API_KEY").filter(|v| !v.is_empty()) {
            self.store.api_key = Some(key);
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
            let host = self
                .server
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.bind = format!("{host}:{port}");
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│            HUB CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Bind: {}", self.server.bind);
        println!("│ Heartbeat Timeout: {}s", self.liveness.timeout_seconds);
        println!("│ Store: {:?} (timeout {}ms)", self.store.backend, self.store.timeout_ms);
        println!("│ Activity Log: {} entries", self.activity.capacity);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
