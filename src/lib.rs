//! Solar Threshold Switch Library
//!
//! This library polls a solar inverter's instantaneous output over Modbus
//! TCP and switches Shelly relay/lamp devices over HTTP when the output
//! crosses configured high/low thresholds, never turning off a device it
//! did not turn on itself.

pub mod config;
pub mod controller;
pub mod error;
pub mod inverter;
pub mod run_loop;
pub mod shelly;
pub mod state_store;
pub mod sun_window;

// Re-export commonly used types for easier access
pub use config::{Config, DeviceConfig, DeviceKind};
pub use controller::{Action, Decision, Reason, SwitchState, ThresholdController};
pub use error::{ConfigError, HttpError, TransportError};
pub use inverter::{InverterReader, PowerSample};
pub use run_loop::RunLoop;
pub use shelly::ShellyClient;
pub use state_store::StateStore;
pub use sun_window::SunWindow;
