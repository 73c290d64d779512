use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::config::DeviceConfig;
use crate::inverter::PowerSample;

/// Observed or commanded switch position of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    On,
    Off,
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::On => write!(f, "on"),
            SwitchState::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    TurnOn,
    TurnOff,
}

/// Why the controller picked the action it did. Logged with every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// State query failed; never act blind.
    StateUnknown,
    AboveHighThreshold,
    BelowLowThreshold,
    /// Output is between the low and high thresholds.
    WithinBand,
    AlreadyOn,
    AlreadyOff,
    /// Device is on but we didn't turn it on, so it is not ours to turn off.
    NotOurs,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reason::StateUnknown => "state-unknown",
            Reason::AboveHighThreshold => "above-high-threshold",
            Reason::BelowLowThreshold => "below-low-threshold",
            Reason::WithinBand => "within-band",
            Reason::AlreadyOn => "already-on",
            Reason::AlreadyOff => "already-off",
            Reason::NotOurs => "not-ours",
        };
        write!(f, "{text}")
    }
}

/// Outcome of one decision for one device in one poll cycle.
#[derive(Debug, Clone)]
pub struct Decision {
    pub device_id: String,
    pub action: Action,
    pub reason: Reason,
}

#[derive(Debug, Default)]
struct DeviceRuntime {
    /// True while this process was the one that last turned the device on.
    controlled_by_us: bool,
    assumed: Option<SwitchState>,
}

/// The threshold-crossing state machine. Holds per-device runtime state in
/// an owned map keyed by device id; thresholds come from the immutable
/// device config passed into each decision.
#[derive(Debug, Default)]
pub struct ThresholdController {
    runtime: HashMap<String, DeviceRuntime>,
}

impl ThresholdController {
    /// Seeds runtime state for each configured device, restoring persisted
    /// controlled-by-us flags where present.
    pub fn new(devices: &[DeviceConfig], saved_flags: &BTreeMap<String, bool>) -> Self {
        let runtime = devices
            .iter()
            .map(|device| {
                let controlled_by_us = saved_flags.get(&device.id).copied().unwrap_or(false);
                (
                    device.id.clone(),
                    DeviceRuntime {
                        controlled_by_us,
                        assumed: None,
                    },
                )
            })
            .collect();
        Self { runtime }
    }

    /// Decides what to do with one device given a fresh power sample and the
    /// device state observed this cycle. Read-only: flags move only when the
    /// actuation succeeds and `apply` is called.
    pub fn decide(
        &self,
        sample: &PowerSample,
        device: &DeviceConfig,
        observed: Option<SwitchState>,
    ) -> Decision {
        let controlled_by_us = self
            .runtime
            .get(&device.id)
            .map(|rt| rt.controlled_by_us)
            .unwrap_or(false);

        let (action, reason) = match observed {
            None => (Action::None, Reason::StateUnknown),
            Some(SwitchState::Off) => {
                if sample.watts >= device.high_threshold {
                    (Action::TurnOn, Reason::AboveHighThreshold)
                } else if sample.watts <= device.low_threshold {
                    (Action::None, Reason::AlreadyOff)
                } else {
                    (Action::None, Reason::WithinBand)
                }
            }
            Some(SwitchState::On) => {
                if sample.watts <= device.low_threshold {
                    if controlled_by_us {
                        (Action::TurnOff, Reason::BelowLowThreshold)
                    } else {
                        (Action::None, Reason::NotOurs)
                    }
                } else if sample.watts >= device.high_threshold {
                    (Action::None, Reason::AlreadyOn)
                } else {
                    (Action::None, Reason::WithinBand)
                }
            }
        };

        Decision {
            device_id: device.id.clone(),
            action,
            reason,
        }
    }

    /// Commits a successfully actuated decision: marks controlled-by-us on
    /// turn-on, clears it on turn-off, and updates the assumed state.
    pub fn apply(&mut self, decision: &Decision) {
        let runtime = self.runtime.entry(decision.device_id.clone()).or_default();
        match decision.action {
            Action::TurnOn => {
                runtime.controlled_by_us = true;
                runtime.assumed = Some(SwitchState::On);
            }
            Action::TurnOff => {
                runtime.controlled_by_us = false;
                runtime.assumed = Some(SwitchState::Off);
            }
            Action::None => {}
        }
    }

    /// Startup probe hook: refresh the assumed state and drop a stale
    /// controlled-by-us flag for a device that is already off.
    pub fn reconcile(&mut self, device_id: &str, observed: SwitchState) {
        if let Some(runtime) = self.runtime.get_mut(device_id) {
            runtime.assumed = Some(observed);
            if observed == SwitchState::Off {
                runtime.controlled_by_us = false;
            }
        }
    }

    pub fn controlled_by_us(&self, device_id: &str) -> bool {
        self.runtime
            .get(device_id)
            .map(|rt| rt.controlled_by_us)
            .unwrap_or(false)
    }

    /// Snapshot of all controlled-by-us flags, for persistence.
    pub fn flags(&self) -> BTreeMap<String, bool> {
        self.runtime
            .iter()
            .map(|(id, rt)| (id.clone(), rt.controlled_by_us))
            .collect()
    }
}
