use std::path::PathBuf;

use thiserror::Error;

/// Failures talking Modbus to the inverter. Reported to the caller so the
/// poll cycle can be skipped; there is no in-cycle retry.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("inverter connect failed: {0}")]
    Connect(String),
    #[error("modbus read failed: {0}")]
    Read(String),
    #[error("modbus exception: {0}")]
    Exception(String),
    #[error("short register read: got {0} registers, expected 2")]
    ShortRead(usize),
    #[error("modbus i/o timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures talking HTTP to a Shelly device.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("device returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Configuration problems. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("device {device}: high threshold {high}W is below low threshold {low}W")]
    ThresholdOrder {
        device: String,
        high: f64,
        low: f64,
    },
    #[error("duplicate device id {0:?}")]
    DuplicateDevice(String),
    #[error("no devices configured")]
    NoDevices,
    #[error("invalid inverter address {addr:?}: {source}")]
    InverterAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("invalid log level {0:?}")]
    LogLevel(String),
    #[error("poll_interval_secs must be at least 1")]
    ZeroInterval,
}
