//! TOML-based configuration for a LanLobby peer.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\LanLobby\config.toml`
//! - Linux:    `~/.config/lanlobby/config.toml` (or `$XDG_CONFIG_HOME`)
//! - macOS:    `~/Library/Application Support/LanLobby/config.toml`
//!
//! An explicit path (the CLI's `--config`) bypasses the platform lookup.
//!
//! ```toml
//! [peer]
//! display_name = "kitchen-laptop"
//! log_level = "info"
//!
//! [discovery]
//! broadcast_address = "255.255.255.255"
//! broadcast_port = 47810
//! interval_ms = 1000
//! stale_after_ms = 3000
//!
//! [session]
//! port = 47811
//! connect_timeout_ms = 3000
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section, or
//! a missing key all fall back to the values shown above.  Addresses are kept
//! as strings on disk and parsed when converted into the runtime structs
//! ([`AdvertiserConfig`], [`ScannerConfig`], [`SessionConfig`]).

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::{AdvertiserConfig, ScannerConfig, SessionConfig};

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

    /// An address field does not hold an IP address.
    #[error("invalid address {value:?} for `{field}`")]
    InvalidAddress { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Identity and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerConfig {
    /// Lobby name used when hosting without an explicit `--name`.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Advertisement and scan settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryConfig {
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,
    /// Address the scanner (and the advertiser's socket) binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Delay between two advertisements.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Minimum age of a latency measurement before a lobby is re-probed.
    #[serde(default = "default_probe_refresh_ms")]
    pub probe_refresh_ms: u64,
    /// Silence after which a scanned lobby is dropped from the list.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

/// Session transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSettings {
    #[serde(default = "default_session_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_display_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "LanLobby".to_string())
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_broadcast_port() -> u16 {
    47810
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_interval_ms() -> u64 {
    1000
}
fn default_probe_timeout_ms() -> u64 {
    500
}
fn default_probe_refresh_ms() -> u64 {
    5000
}
fn default_stale_after_ms() -> u64 {
    3000
}
fn default_session_port() -> u16 {
    47811
}
fn default_connect_timeout_ms() -> u64 {
    3000
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            broadcast_address: default_broadcast_address(),
            broadcast_port: default_broadcast_port(),
            bind_address: default_bind_address(),
            interval_ms: default_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_refresh_ms: default_probe_refresh_ms(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            port: default_session_port(),
            bind_address: default_bind_address(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

// ── Runtime conversion ────────────────────────────────────────────────────────

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

impl AppConfig {
    /// Settings for the host's advertiser.
    pub fn advertiser_config(&self) -> Result<AdvertiserConfig, ConfigError> {
        let d = &self.discovery;
        Ok(AdvertiserConfig {
            broadcast_address: parse_ip("discovery.broadcast_address", &d.broadcast_address)?,
            broadcast_port: d.broadcast_port,
            bind_address: parse_ip("discovery.bind_address", &d.bind_address)?,
            interval: Duration::from_millis(d.interval_ms),
        })
    }

    /// Settings for the guest's scanner.
    pub fn scanner_config(&self) -> Result<ScannerConfig, ConfigError> {
        let d = &self.discovery;
        Ok(ScannerConfig {
            broadcast_port: d.broadcast_port,
            bind_address: parse_ip("discovery.bind_address", &d.bind_address)?,
            probe_timeout: Duration::from_millis(d.probe_timeout_ms),
            probe_refresh: Duration::from_millis(d.probe_refresh_ms),
            stale_after: Duration::from_millis(d.stale_after_ms),
        })
    }

    /// Settings for the session transport, on both sides.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        Ok(SessionConfig {
            port: self.session.port,
            bind_address: parse_ip("session.bind_address", &self.session.bind_address)?,
            connect_timeout: Duration::from_millis(self.session.connect_timeout_ms),
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file.  A missing file yields
/// `AppConfig::default()`.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning defaults if the file does not
/// exist.
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

/// Persists `config` to the platform config file.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
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

/// Resolves the platform config base directory including the `LanLobby`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LanLobby"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lanlobby"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LanLobby")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
