use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_derive::Deserialize;

use crate::error::ConfigError;

/// Default Growatt-style input register holding instantaneous output power.
const DEFAULT_POWER_REGISTER: u16 = 5029;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Top-level configuration, loaded once at startup from a JSON file and
/// immutable for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Append-only log file. Logs go to stdout when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Modbus TCP address of the inverter, `host:port`.
    pub inverter_addr: String,
    #[serde(default = "default_power_register")]
    pub power_register: u16,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Persisted controlled-by-us flags survive restarts when set.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// When set, polling pauses between sunset and the next sunrise.
    #[serde(default)]
    pub sun_window: Option<SunWindowConfig>,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SunWindowConfig {
    pub latitude: f64,
    pub longitude: f64,
}

/// One Shelly relay or lamp with its switching thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    /// HTTP address of the device, `host` or `host:port`, no scheme.
    pub addr: String,
    #[serde(default)]
    pub kind: DeviceKind,
    pub high_threshold: f64,
    pub low_threshold: f64,
    #[serde(default)]
    pub auth: Option<DeviceAuth>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Relay,
    Lamp,
}

impl DeviceKind {
    /// Channel path on the device, per the Shelly gen1 HTTP API.
    pub fn channel_path(&self) -> &'static str {
        match self {
            DeviceKind::Relay => "relay/0",
            DeviceKind::Lamp => "light/0",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuth {
    pub username: String,
    pub password: String,
}

impl Config {
    /// Loads and validates the configuration. Any error here is fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        self.inverter_socket_addr()?;
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.id.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.id.clone()));
            }
            // Hysteresis only works when the band is ordered.
            if device.high_threshold < device.low_threshold {
                return Err(ConfigError::ThresholdOrder {
                    device: device.id.clone(),
                    high: device.high_threshold,
                    low: device.low_threshold,
                });
            }
        }
        Ok(())
    }

    pub fn inverter_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.inverter_addr
            .parse()
            .map_err(|source| ConfigError::InverterAddr {
                addr: self.inverter_addr.clone(),
                source,
            })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_power_register() -> u16 {
    DEFAULT_POWER_REGISTER
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
