//! TOML-based configuration for the recorder.
//!
//! Reads and writes [`RecorderConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\CamLink\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/camlink/config.toml` (or `~/.config/camlink/`)
//! - macOS:    `~/Library/Application Support/CamLink/config.toml`
//!
//! Every field has a serde default, so a missing file, an empty file, and a
//! file from an older version all load:
//!
//! ```toml
//! [device]
//! address = "192.168.22.215"
//! kind = "left_eye"
//!
//! [connection]
//! connect_timeout_ms = 10000
//! stall_warning_secs = 60
//!
//! [reconnect]
//! max_attempts = 5
//! retry_delay_secs = 5
//!
//! [output]
//! directory = "recordings"
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use camlink_core::{DeviceKind, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::RecorderSettings;

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
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecorderConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which device to record from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Last address used; the CLI falls back to it when `--address` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Adds the device's mDNS endpoint as a last candidate.
    #[serde(default)]
    pub kind: DeviceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Handshake timeout per candidate URI.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Warn when no message arrives for this long.
    #[serde(default = "default_stall_warning_secs")]
    pub stall_warning_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Root directory for recording folders.
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_stall_warning_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    camlink_core::domain::reconnect::DEFAULT_MAX_ATTEMPTS
}
fn default_retry_delay_secs() -> u64 {
    camlink_core::domain::reconnect::DEFAULT_RETRY_DELAY.as_secs()
}
fn default_output_directory() -> PathBuf {
    PathBuf::from("recordings")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            stall_warning_secs: default_stall_warning_secs(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            log_level: default_log_level(),
        }
    }
}

impl RecorderConfig {
    /// The runtime settings this file describes.
    pub fn settings(&self) -> RecorderSettings {
        RecorderSettings {
            policy: ReconnectPolicy {
                max_attempts: self.reconnect.max_attempts,
                retry_delay: Duration::from_secs(self.reconnect.retry_delay_secs),
            },
            connect_timeout: Duration::from_millis(self.connection.connect_timeout_ms),
            stall_warning: Duration::from_secs(self.connection.stall_warning_secs),
            device_kind: self.device.kind,
            ..RecorderSettings::default()
        }
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

/// Loads the config from the default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<RecorderConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<RecorderConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Ok(RecorderConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &RecorderConfig, path: &Path) -> Result<(), ConfigError> {
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

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("CamLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("camlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("CamLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
