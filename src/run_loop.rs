use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Config, DeviceConfig};
use crate::controller::{Action, SwitchState, ThresholdController};
use crate::inverter::InverterReader;
use crate::shelly::ShellyClient;
use crate::state_store::StateStore;
use crate::sun_window::SunWindow;

/// Drives the poll cycle: read the inverter, refresh each device's state,
/// let the controller decide, actuate, log. Every failure is logged and the
/// loop moves on; nothing past startup aborts it.
pub struct RunLoop {
    poll_interval: Duration,
    devices: Vec<DeviceConfig>,
    reader: InverterReader,
    client: ShellyClient,
    controller: ThresholdController,
    store: Option<StateStore>,
    sun_window: Option<SunWindow>,
}

impl RunLoop {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let target = config.inverter_socket_addr()?;
        let reader = InverterReader::new(target, config.power_register);
        let client = ShellyClient::new()?;

        let store = config.state_file.clone().map(StateStore::new);
        let saved_flags = match &store {
            Some(store) => store.load().unwrap_or_else(|err| {
                warn!(error = %err, "could not load device state file, assuming no device is ours");
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };
        let controller = ThresholdController::new(&config.devices, &saved_flags);

        Ok(Self {
            poll_interval: config.poll_interval(),
            devices: config.devices.clone(),
            reader,
            client,
            controller,
            store,
            sun_window: config.sun_window.map(SunWindow::new),
        })
    }

    /// Runs forever. Cancellation is the caller's job (ctrl-c in main).
    pub async fn run(&mut self) {
        self.startup_probe().await;

        let mut tick = self.poll_ticker();
        loop {
            tick.tick().await;
            self.run_cycle().await;
            self.wait_out_night().await;
        }
    }

    /// Poll-cycle ticker. Ticks missed while sleeping out the night are
    /// skipped, so dawn starts a normally spaced cycle instead of replaying
    /// every missed tick back-to-back against the inverter and devices.
    fn poll_ticker(&self) -> Interval {
        let mut tick = interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick
    }

    /// Logs each device's initial state and drops controlled-by-us flags
    /// that no longer match reality. A device already on without a flag is
    /// assumed user-controlled and left alone.
    async fn startup_probe(&mut self) {
        for device in &self.devices {
            match self.client.get_state(device).await {
                Ok(observed) => {
                    info!(
                        device = %device.id,
                        state = %observed,
                        ours = self.controller.controlled_by_us(&device.id),
                        "initial device state"
                    );
                    self.controller.reconcile(&device.id, observed);
                }
                Err(err) => {
                    error!(device = %device.id, error = %err, "initial state query failed");
                }
            }
        }
        self.persist_flags();
    }

    /// One poll cycle: a failed inverter read skips the whole cycle without
    /// touching any device; a failed device call skips that device only.
    pub async fn run_cycle(&mut self) {
        let sample = match self.reader.read().await {
            Ok(sample) => sample,
            Err(err) => {
                error!(error = %err, "inverter read failed, skipping cycle");
                return;
            }
        };
        info!(watts = sample.watts, "solar output");

        for device in &self.devices {
            // Refresh the state before acting; an external actor may have
            // flipped the switch since the last cycle.
            let observed = match self.client.get_state(device).await {
                Ok(state) => Some(state),
                Err(err) => {
                    error!(device = %device.id, error = %err, "state query failed");
                    None
                }
            };

            let decision = self.controller.decide(&sample, device, observed);
            let desired = match decision.action {
                Action::None => {
                    debug!(
                        device = %device.id,
                        reason = %decision.reason,
                        watts = sample.watts,
                        "no action"
                    );
                    continue;
                }
                Action::TurnOn => SwitchState::On,
                Action::TurnOff => SwitchState::Off,
            };

            match self.client.set_state(device, desired).await {
                Ok(()) => {
                    self.controller.apply(&decision);
                    info!(
                        device = %device.id,
                        state = %desired,
                        reason = %decision.reason,
                        watts = sample.watts,
                        "switched device"
                    );
                    self.persist_flags();
                }
                Err(err) => {
                    // Flags stay uncommitted; the next cycle re-decides
                    // from a fresh observed state.
                    error!(
                        device = %device.id,
                        state = %desired,
                        error = %err,
                        "switch command failed"
                    );
                }
            }
        }
    }

    /// Past sunset there is nothing to poll; sleep until the next sunrise.
    /// Takes `&mut self` so the future stays `Send`: a shared borrow held
    /// across the sleep would drag the non-`Sync` Modbus context along.
    async fn wait_out_night(&mut self) {
        let Some(window) = &self.sun_window else {
            return;
        };
        let now = Utc::now();
        if !window.is_after_sunset(now) {
            return;
        }
        let Some(next_sunrise) = window.next_sunrise(now) else {
            return;
        };
        let pause = (next_sunrise - now).to_std().unwrap_or_default();
        info!(until = %next_sunrise, "past sunset, pausing until next sunrise");
        sleep(pause).await;
        info!("woke at sunrise, resuming polling");
    }

    fn persist_flags(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save(&self.controller.flags()) {
                error!(error = %err, "could not persist device state file");
            }
        }
    }

    /// Test hook: whether the controller currently owns the device.
    pub fn controls_device(&self, device_id: &str) -> bool {
        self.controller.controlled_by_us(device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceKind;

    fn config() -> Config {
        Config {
            log_level: "info".to_string(),
            log_file: None,
            inverter_addr: "127.0.0.1:5020".to_string(),
            power_register: 5029,
            poll_interval_secs: 5,
            state_file: None,
            sun_window: None,
            devices: vec![DeviceConfig {
                id: "relay".to_string(),
                addr: "127.0.0.1:8080".to_string(),
                kind: DeviceKind::Relay,
                high_threshold: 500.0,
                low_threshold: 100.0,
                auth: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_run_future_is_send() {
        fn require_send<T: Send>(_: T) {}

        // The run future must be spawnable onto the multi-thread runtime;
        // this fails to compile if any borrow held across an await point
        // drags a non-Sync field along.
        let mut run_loop = RunLoop::new(&config()).unwrap();
        require_send(run_loop.run());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_ticker_skips_ticks_missed_overnight() {
        let run_loop = RunLoop::new(&config()).unwrap();
        let mut ticker = run_loop.poll_ticker();

        ticker.tick().await;
        tokio::time::advance(Duration::from_secs(8 * 3600)).await;

        // One catch-up tick fires after the gap; the one after it must keep
        // the configured spacing instead of replaying the whole night.
        ticker.tick().await;
        let resumed = tokio::time::Instant::now();
        ticker.tick().await;
        assert!(
            resumed.elapsed() >= Duration::from_secs(4),
            "ticks missed overnight must not burst back-to-back"
        );
    }
}
