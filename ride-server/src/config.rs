//! Server configuration
//!
//! Loaded from JSON at `$RIDESYNC_CONFIG`, or `<config dir>/ridesync/config.json`
//! when that variable is unset. Every field has a default, so a missing
//! default file simply yields the default configuration. `RIDESYNC_PORT`
//! overrides the port from either source.

use ride_core::adapter::DEFAULT_RIDER_WEIGHT;
use ride_engine::{EstimatorConfig, SyncConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_ENV: &str = "RIDESYNC_CONFIG";
pub const PORT_ENV: &str = "RIDESYNC_PORT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid RIDESYNC_PORT value {0:?}")]
    Port(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    /// Ride tick: frame read, estimate, activity report (ms)
    pub ride_tick_ms: u64,

    /// Adapter detection poll (ms)
    pub detection_interval_ms: u64,

    /// Simulated video player tick (ms)
    pub player_tick_ms: u64,

    pub rider_weight: f64,

    /// Slope scaling applied to the demo ride (0-100)
    pub reality_factor: f64,

    /// Base power of the demo rider (W)
    pub demo_power: f64,

    pub estimator: EstimatorConfig,
    pub sync: SyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9100,
            ride_tick_ms: 500,
            detection_interval_ms: 1000,
            player_tick_ms: 100,
            rider_weight: DEFAULT_RIDER_WEIGHT,
            reality_factor: 100.0,
            demo_power: 180.0,
            estimator: EstimatorConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl ServerConfig {
    /// `<config dir>/ridesync/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ridesync").join("config.json"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the config from the environment and the filesystem
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var_os(CONFIG_ENV) {
            // an explicit path must exist
            Some(path) => Self::from_file(Path::new(&path))?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.with_port_override(std::env::var(PORT_ENV).ok().as_deref())
    }

    pub fn with_port_override(mut self, port: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(value) = port {
            self.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Port(value.to_string()))?;
        }
        Ok(self)
    }

    pub fn ride_tick(&self) -> Duration {
        Duration::from_millis(self.ride_tick_ms.max(1))
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn player_tick(&self) -> Duration {
        Duration::from_millis(self.player_tick_ms.max(1))
    }
}
