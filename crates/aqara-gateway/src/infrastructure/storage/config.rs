//! TOML-based configuration for the gateway client.
//!
//! Reads `AppConfig` from an explicit path or the platform default:
//! - Windows:  `%APPDATA%\aqara-gateway\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/aqara-gateway/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/aqara-gateway/config.toml`
//!
//! # Example file
//!
//! ```toml
//! [general]
//! log_level = "debug"
//!
//! [network]
//! interface = "eth0"
//! discovery_timeout_ms = 1000
//! command_timeout_ms = 5000
//!
//! [[gateways]]
//! sid = "f0b429aa1463"
//! ip = "192.168.1.20"
//! key = "0987654321qwerty"
//! ```
//!
//! A `[[gateways]]` entry without `ip` only contributes its `key`: the
//! address is then found by discovery and the key is attached to the
//! discovered gateway with the same `sid`.
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = ...)]`, so a partial or missing file
//! yields a usable configuration.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A gateway entry carries an address that is not an IPv4 address.
    #[error("gateway {sid}: `{value}` is not a valid IPv4 address")]
    InvalidAddress { sid: String, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub gateways: Vec<GatewayEntry>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GeneralConfig {
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Interface and timing settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Interface name or local IPv4 address.  Required for discovery and
    /// listening; the CLI may supply it instead.
    #[serde(default)]
    pub interface: Option<String>,
    /// How long discovery waits for `iam` replies.
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    /// Reply timeout for commands.  `0` waits forever.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

/// A known gateway.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GatewayEntry {
    pub sid: String,
    /// Static address; if absent the gateway is found by discovery.
    #[serde(default)]
    pub ip: Option<String>,
    /// Gateway password from the Aqara app.
    #[serde(default)]
    pub key: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_discovery_timeout_ms() -> u64 {
    1000
}
fn default_command_timeout_ms() -> u64 {
    5000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: None,
            discovery_timeout_ms: default_discovery_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// `None` when commands should wait forever.
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_ms > 0).then(|| Duration::from_millis(self.command_timeout_ms))
    }
}

impl GatewayEntry {
    /// Parses the static address, if one is configured.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidAddress`] if `ip` is not an IPv4 address.
    pub fn address(&self) -> Result<Option<Ipv4Addr>, ConfigError> {
        self.ip
            .as_deref()
            .map(|value| {
                value.parse().map_err(|_| ConfigError::InvalidAddress {
                    sid: self.sid.clone(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(platform_config_dir()
        .ok_or(ConfigError::NoPlatformConfigDir)?
        .join("config.toml"))
}

/// Loads `AppConfig` from `path` (or the platform default), returning
/// `AppConfig::default()` if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match config_file_path() {
            Ok(p) => p,
            Err(ConfigError::NoPlatformConfigDir) => return Ok(AppConfig::default()),
            Err(e) => return Err(e),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("aqara-gateway"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("aqara-gateway"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("aqara-gateway")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
