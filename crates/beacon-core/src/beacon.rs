//! The supervisory loop.
//!
//! ```text
//! Init ─► Sampling ─► Encoding ─► Broadcasting ─► WatchdogFeeding ─► Idle ─┐
//!            ▲                                                             │
//!            └─────────────────────────────────────────────────────────────┘
//!   any fault, or uptime budget spent ─► Rebooting (absorbing)
//! ```
//!
//! Faults are never retried here. Each one is returned as a [`RebootReason`]
//! and the caller hands it to the reboot policy.

use embedded_hal_async::delay::DelayNs;
use log::{debug, info, trace};

use crate::advertising::{AdvertisingController, RadioStack};
use crate::config::BeaconConfig;
use crate::reboot::{RebootReason, UptimeBudget};
use crate::record::StateRecord;
use crate::sensors::{Readings, SensorDevice, SensorReader};
use crate::watchdog::{ChannelId, StarvationHandler, WatchdogDevice, WatchdogSupervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Sampling,
    Encoding,
    Broadcasting,
    WatchdogFeeding,
    Idle,
    Rebooting(RebootReason),
}

/// Collaborators handed to [`Beacon::init`].
pub struct BeaconHardware<S, R, W> {
    pub sensor: S,
    pub radio: R,
    pub watchdog: W,
    /// Runs when the watchdog starves; must reset the device on its own.
    pub on_starvation: StarvationHandler,
}

/// Owns the state record and every subsystem.
///
/// The record is only ever mutated here; the advertising controller gets a
/// shared borrow for serialization.
pub struct Beacon<S, R, W, D> {
    config: BeaconConfig,
    sensor: SensorReader<S>,
    radio: AdvertisingController<R, D>,
    watchdog: WatchdogSupervisor<W>,
    channel: ChannelId,
    record: StateRecord,
    budget: UptimeBudget,
    delay: D,
    state: LoopState,
    observations: u32,
}

impl<S, R, W, D> Beacon<S, R, W, D>
where
    S: SensorDevice,
    R: RadioStack,
    W: WatchdogDevice,
    D: DelayNs + Clone,
{
    /// Bring subsystems up in dependency order: watchdog, sensor, radio.
    ///
    /// Any failure is fatal and returned as the reboot reason.
    pub async fn init(
        config: BeaconConfig,
        hardware: BeaconHardware<S, R, W>,
        delay: D,
    ) -> Result<Self, RebootReason> {
        info!("Starting beacon '{}'", config.device_name);

        let mut watchdog = WatchdogSupervisor::new(hardware.watchdog, hardware.on_starvation);
        let channel = watchdog.arm(config.watchdog_timeout_ms)?;

        let sensor = SensorReader::bind(hardware.sensor).await?;

        let mut radio = AdvertisingController::new(hardware.radio, delay.clone(), &config.radio);
        radio.enable(&config.device_name).await?;

        Ok(Self {
            budget: UptimeBudget::new(config.uptime_cycles),
            config,
            sensor,
            radio,
            watchdog,
            channel,
            record: StateRecord::new(),
            delay,
            state: LoopState::Init,
            observations: 0,
        })
    }

    fn enter(&mut self, next: LoopState) {
        trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// One pass from `Sampling` through `WatchdogFeeding`.
    ///
    /// The watchdog is fed only after the broadcast attempt has completed.
    pub async fn cycle(&mut self) -> Result<(), RebootReason> {
        self.enter(LoopState::Sampling);
        let readings = self.sensor.read().await?;

        self.enter(LoopState::Encoding);
        self.record.apply(&readings);
        self.record.advance_serial();
        self.observe(&readings);

        self.enter(LoopState::Broadcasting);
        self.radio.restart(&self.record).await?;

        self.enter(LoopState::WatchdogFeeding);
        self.watchdog.feed(self.channel)?;

        if self.budget.tick() {
            info!(
                "Uptime bound of {} cycles reached",
                self.config.uptime_cycles
            );
            return Err(RebootReason::Scheduled);
        }

        Ok(())
    }

    fn observe(&mut self, readings: &Readings) {
        self.observations = self.observations.wrapping_add(1);
        info!(
            "Observation {}: temp {} C, rH {}%, serial {}",
            self.observations,
            readings.temperature,
            readings.humidity,
            self.record.serial()
        );
    }

    /// Sleep out the sample interval in slices, logging a heartbeat per slice.
    async fn idle(&mut self) {
        self.enter(LoopState::Idle);

        let mut remaining = self.config.sample_interval_ms;
        while remaining > 0 {
            let slice = remaining.min(self.config.heartbeat_slice_ms);
            self.delay.delay_ms(slice).await;
            remaining -= slice;
            debug!(
                "Heartbeat: {} ms to next sample, {} cycles to scheduled reboot",
                remaining,
                self.budget.remaining()
            );
        }
    }

    /// Run cycles until one ends in a reboot reason.
    pub async fn run(&mut self) -> RebootReason {
        loop {
            if let Err(reason) = self.cycle().await {
                debug!("Cycle aborted in {:?}: {}", self.state, reason);
                self.enter(LoopState::Rebooting(reason));
                return reason;
            }
            self.idle().await;
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn record(&self) -> &StateRecord {
        &self.record
    }

    pub fn observations(&self) -> u32 {
        self.observations
    }

    pub fn radio(&self) -> &AdvertisingController<R, D> {
        &self.radio
    }

    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }
}

/// Init followed by the loop; resolves with the reason the device must reset.
///
/// Pass the result to [`RebootPolicy::reboot`](crate::reboot::RebootPolicy::reboot).
pub async fn boot<S, R, W, D>(
    config: BeaconConfig,
    hardware: BeaconHardware<S, R, W>,
    delay: D,
) -> RebootReason
where
    S: SensorDevice,
    R: RadioStack,
    W: WatchdogDevice,
    D: DelayNs + Clone,
{
    match Beacon::init(config, hardware, delay).await {
        Ok(mut beacon) => beacon.run().await,
        Err(reason) => {
            debug!("Init aborted: {}", reason);
            reason
        }
    }
}
