//! TOML-based configuration for the ClipSync host.
//!
//! Reads and writes `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\ClipSync\config.toml`
//! - Linux:    `~/.config/clipsync/config.toml` (or `$XDG_CONFIG_HOME/clipsync`)
//! - macOS:    `~/Library/Application Support/ClipSync/config.toml`
//!
//! A complete file looks like this; every key is optional:
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [relay]
//! bind_address = "0.0.0.0"
//! base_port = 5150
//! port_range = 20
//! io_timeout_ms = 1000
//! forward_inbound = false
//!
//! [detector]
//! poll_interval_ms = 500
//!
//! [discovery]
//! enabled = true
//! port = 5149
//! broadcast_address = "255.255.255.255"
//! interval_secs = 5
//! device_type = "windows"
//! # device_name = "my-desktop"   # defaults to the host name
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the key is absent, and whole sections fall back to
//! their `Default` impl.  A missing file is the same as an empty one.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clipsync_core::protocol::messages::{
    DEFAULT_DISCOVERY_PORT, DEFAULT_PORT_RANGE, DEFAULT_RELAY_PORT, HOST_DEVICE_TYPE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::discovery::BeaconConfig;
use crate::infrastructure::network::relay::RelayConfig;

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

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is not usable (e.g. a malformed IP address).
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub detector: DetectorSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is not set, e.g. `"info"` or
    /// `"clipsync_host=debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// TCP relay settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaySection {
    /// IP address the listener binds to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// First TCP port tried.
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Number of consecutive ports tried.
    #[serde(default = "default_port_range")]
    pub port_range: u16,
    /// Accept/read/write timeout in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Re-broadcast updates received from one peer to the other peers.
    #[serde(default)]
    pub forward_inbound: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorSection {
    /// Time between clipboard reads, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// UDP discovery beacon settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// UDP port peers listen on.
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// Destination address for beacons.
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Advertised `deviceType`.  Mobile peers filter on this value.
    #[serde(default = "default_device_type")]
    pub device_type: String,
    /// Advertised `deviceName`; the host name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_base_port() -> u16 {
    DEFAULT_RELAY_PORT
}
fn default_port_range() -> u16 {
    DEFAULT_PORT_RANGE
}
fn default_io_timeout_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_interval_secs() -> u64 {
    5
}
fn default_device_type() -> String {
    HOST_DEVICE_TYPE.to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            base_port: default_base_port(),
            port_range: default_port_range(),
            io_timeout_ms: default_io_timeout_ms(),
            forward_inbound: false,
        }
    }
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_discovery_port(),
            broadcast_address: default_broadcast_address(),
            interval_secs: default_interval_secs(),
            device_type: default_device_type(),
            device_name: None,
        }
    }
}

// ── Conversion to runtime settings ────────────────────────────────────────────

impl RelaySection {
    /// Validates the section and converts it to a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_address` is not an IP address.
    pub fn to_relay_config(&self) -> Result<RelayConfig, ConfigError> {
        let bind_address: IpAddr =
            self.bind_address
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                    key: "relay.bind_address",
                    reason: e.to_string(),
                })?;
        Ok(RelayConfig {
            bind_address,
            base_port: self.base_port,
            port_range: self.port_range,
            io_timeout: Duration::from_millis(self.io_timeout_ms.max(1)),
            forward_inbound: self.forward_inbound,
        })
    }
}

impl DetectorSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl DiscoverySection {
    /// Validates the section and converts it to a [`BeaconConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `broadcast_address` is not an IP address.
    pub fn to_beacon_config(&self) -> Result<BeaconConfig, ConfigError> {
        let ip: IpAddr = self.broadcast_address.parse().map_err(
            |e: std::net::AddrParseError| ConfigError::Invalid {
                key: "discovery.broadcast_address",
                reason: e.to_string(),
            },
        )?;
        Ok(BeaconConfig {
            target: SocketAddr::new(ip, self.port),
            interval: Duration::from_secs(self.interval_secs.max(1)),
            device_type: self.device_type.clone(),
            device_name: self.device_name.clone(),
        })
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
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `ClipSync` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ClipSync"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("clipsync"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ClipSync")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
