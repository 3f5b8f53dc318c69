//! Bridge configuration
//!
//! Stored as TOML under the user configuration directory. Every section has
//! defaults, so a missing or partial file still yields a usable setup, and
//! invalid values typed in by a user fall back instead of failing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "joybridge";
const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_INGEST_PORT: u16 = 19999;
pub const DEFAULT_TARGET_HOST: &str = "192.168.1.100";
pub const DEFAULT_TARGET_PORT: u16 = 9999;
pub const DEFAULT_INTERVAL_MS: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

/// Remote listener the periodic sender transmits to.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TargetEndpoint {
    pub host: String,
    pub port: u16,
    pub interval_ms: u32,
}

impl Default for TargetEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_TARGET_HOST.to_string(),
            port: DEFAULT_TARGET_PORT,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl TargetEndpoint {
    pub fn new(host: impl Into<String>, port: u16, interval_ms: u32) -> Self {
        Self {
            host: host.into(),
            port,
            interval_ms,
        }
    }

    /// Builds an endpoint from free-form user input.
    ///
    /// Empty host, unparseable or zero port and unparseable or zero interval
    /// fall back to the defaults.
    pub fn from_input(host: &str, port: &str, interval_ms: &str) -> Self {
        let host = host.trim();
        Self {
            host: if host.is_empty() {
                DEFAULT_TARGET_HOST.to_string()
            } else {
                host.to_string()
            },
            port: parse_port(port, DEFAULT_TARGET_PORT),
            interval_ms: parse_interval_ms(interval_ms),
        }
    }

    /// Tick interval; zero is treated as unset.
    pub fn interval(&self) -> Duration {
        let ms = if self.interval_ms == 0 {
            DEFAULT_INTERVAL_MS
        } else {
            self.interval_ms
        };
        Duration::from_millis(u64::from(ms))
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    pub port: u16,
    /// Every pattern must appear (case-insensitively) in the device name.
    pub device_name_patterns: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_INGEST_PORT,
            device_name_patterns: vec!["DJI".to_string(), "joystick".to_string()],
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct AxisConfig {
    pub invert_vertical: bool,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            invert_vertical: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GamepadConfig {
    pub enabled: bool,
    pub deadzone: f32,
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            deadzone: 0.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub ingest: IngestConfig,
    pub target: TargetEndpoint,
    pub axes: AxisConfig,
    pub gamepad: GamepadConfig,
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Loads the file at `path`, degrading to defaults on any failure.
    pub async fn load_or_default(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(path, self.to_toml_string()?)
            .await
            .map_err(io_error)?;
        debug!("Configuration written to {}", path.display());
        Ok(())
    }
}

/// `<config dir>/joybridge/config.toml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDir)
}

/// Writes a default configuration file if none exists yet.
pub async fn ensure_default_config(path: &Path) -> Result<(), ConfigError> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if !exists {
        info!("Creating default configuration at {}", path.display());
        BridgeConfig::default().save(path).await?;
    }
    Ok(())
}

/// Parses a port typed in by a user; zero and garbage yield `default`.
pub fn parse_port(text: &str, default: u16) -> u16 {
    match text.trim().parse::<u16>() {
        Ok(port) if port != 0 => port,
        _ => default,
    }
}

pub fn parse_interval_ms(text: &str) -> u32 {
    match text.trim().parse::<u32>() {
        Ok(ms) if ms != 0 => ms,
        _ => DEFAULT_INTERVAL_MS,
    }
}
