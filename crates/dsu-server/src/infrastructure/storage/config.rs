//! Configuration loading.
//!
//! The file lists the devices to serve, by exact evdev name, and the
//! orientation profile each one uses:
//!
//! ```json
//! {
//!   "port": 26760,
//!   "bind_address": "127.0.0.1",
//!   "devices": [
//!     { "name": "Nintendo Switch Pro Controller IMU", "profile": "pro" }
//!   ],
//!   "profiles": {
//!     "pro": { "accel": "x+z+y-", "gyro": "x+z+y-", "gyro_sensitivity": 2.0 }
//!   }
//! }
//! ```
//!
//! A file ending in `.toml` is read as TOML with the same schema; anything
//! else is read as JSON.
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the value of
//! `some_fn()` when absent, so a file containing only `devices` and
//! `profiles` is complete.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use dsu_core::protocol::{DEFAULT_PORT, MAX_SLOTS};
use dsu_core::{DeviceConfig, OrientationProfile, ProfileError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON content could not be parsed.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("too many devices ({0}), at most {MAX_SLOTS} are supported")]
    TooManyDevices(usize),

    #[error("duplicate device `{0}`")]
    DuplicateDevice(String),

    #[error("device `{device}` uses unknown profile `{profile}`")]
    UnknownProfile { device: String, profile: String },

    #[error("invalid profile `{name}`: {source}")]
    InvalidProfile {
        name: String,
        #[source]
        source: ProfileError,
    },
}

/// File formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// UDP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address to bind.  Loopback by default: DSU has no authentication.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// Devices in slot order.
    pub devices: Vec<DeviceEntry>,
    pub profiles: HashMap<String, ProfileEntry>,
}

/// One configured device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    /// Exact evdev device name.
    pub name: String,
    /// Key into [`ServerConfig::profiles`].
    pub profile: String,
}

/// Axis bindings of one orientation profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro: Option<String>,
    #[serde(default = "default_gyro_sensitivity")]
    pub gyro_sensitivity: f64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_gyro_sensitivity() -> f64 {
    1.0
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            devices: Vec::new(),
            profiles: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Socket address the server binds.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Resolves every device's profile and returns them in slot order.
    ///
    /// All profiles are parsed, including ones no device uses, so typos
    /// surface immediately.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] validation variant.
    pub fn device_configs(&self) -> Result<Vec<DeviceConfig>, ConfigError> {
        if self.devices.len() > MAX_SLOTS {
            return Err(ConfigError::TooManyDevices(self.devices.len()));
        }

        let mut profiles = HashMap::with_capacity(self.profiles.len());
        for (name, entry) in &self.profiles {
            let profile = OrientationProfile::parse(
                entry.accel.as_deref(),
                entry.gyro.as_deref(),
                entry.gyro_sensitivity,
            )
            .map_err(|source| ConfigError::InvalidProfile {
                name: name.clone(),
                source,
            })?;
            profiles.insert(name.as_str(), profile);
        }

        let mut configs: Vec<DeviceConfig> = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            if configs.iter().any(|c| c.name == device.name) {
                return Err(ConfigError::DuplicateDevice(device.name.clone()));
            }
            let profile = profiles.get(device.profile.as_str()).cloned().ok_or_else(|| {
                ConfigError::UnknownProfile {
                    device: device.name.clone(),
                    profile: device.profile.clone(),
                }
            })?;
            configs.push(DeviceConfig {
                name: device.name.clone(),
                profile,
            });
        }
        Ok(configs)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration text in the given format.
///
/// # Errors
///
/// [`ConfigError::Json`] or [`ConfigError::Toml`] for malformed input.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<ServerConfig, ConfigError> {
    Ok(match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
    })
}

/// Reads and parses the configuration file at `path`.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, otherwise as
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, ConfigFormat::from_path(path))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
