//! Reboot policy: every fault ends in a logged, delayed cold reset.

use embedded_hal::delay::DelayNs;
use log::{error, info};
use thiserror_no_std::Error;

use crate::advertising::RadioFault;
use crate::sensors::SensorFault;
use crate::watchdog::WatchdogFault;

/// Why the device is about to reset.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootReason {
    #[error("{0}")]
    Sensor(#[from] SensorFault),
    #[error("{0}")]
    Radio(#[from] RadioFault),
    #[error("{0}")]
    Watchdog(#[from] WatchdogFault),
    /// Bounded uptime reached; not an error.
    #[error("scheduled")]
    Scheduled,
}

impl RebootReason {
    pub const fn is_fault(self) -> bool {
        !matches!(self, Self::Scheduled)
    }
}

/// Power control as seen by the beacon.
pub trait PowerControl {
    /// Full power-cycle restart. Never returns.
    fn cold_reset(&mut self) -> !;
}

/// Centralizes "log, let things settle, cold reset".
pub struct RebootPolicy<P, D> {
    power: P,
    delay: D,
    settle_ms: u32,
}

impl<P: PowerControl, D: DelayNs> RebootPolicy<P, D> {
    pub fn new(power: P, delay: D, settle_ms: u32) -> Self {
        Self {
            power,
            delay,
            settle_ms,
        }
    }

    /// Log the reason, wait for the log to flush and the radio to wind down,
    /// then reset. Nothing can cancel this once called.
    pub fn reboot(&mut self, reason: RebootReason) -> ! {
        if reason.is_fault() {
            error!("Rebooting: {}", reason);
        } else {
            info!("Rebooting: {}", reason);
        }

        self.delay.delay_ms(self.settle_ms);
        self.power.cold_reset()
    }
}

/// Number of cycles left before the scheduled reboot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimeBudget {
    remaining: u32,
}

impl UptimeBudget {
    pub const fn new(cycles: u32) -> Self {
        Self { remaining: cycles }
    }

    /// Count one completed cycle; `true` once the budget is spent.
    pub fn tick(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }

    pub const fn remaining(&self) -> u32 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorChannel;
    use crate::testing::{Event, EventLog, MockDelay, MockPower};
    use alloc::string::ToString;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn test_reason_messages() {
        assert_eq!(
            RebootReason::from(SensorFault::Fetch).to_string(),
            "Sensor sample update error"
        );
        assert_eq!(
            RebootReason::from(SensorFault::Channel(SensorChannel::AmbientTemperature)).to_string(),
            "Cannot read temperature channel"
        );
        assert_eq!(RebootReason::Scheduled.to_string(), "scheduled");
        assert!(!RebootReason::Scheduled.is_fault());
        assert!(RebootReason::from(RadioFault::Start).is_fault());
    }

    #[test]
    fn test_reboot_settles_before_reset() {
        let log = EventLog::default();
        let mut policy = RebootPolicy::new(MockPower::new(&log), MockDelay::new(&log), 3_000);

        let result = catch_unwind(AssertUnwindSafe(|| {
            policy.reboot(RebootReason::Watchdog(WatchdogFault::Feed));
        }));

        assert!(result.is_err());
        assert_eq!(log.events(), [Event::Sleep(3_000), Event::ColdReset]);
    }

    #[test]
    fn test_budget_trips_on_last_cycle() {
        let mut budget = UptimeBudget::new(3);

        assert!(!budget.tick());
        assert!(!budget.tick());
        assert!(budget.tick());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_budget_of_one() {
        let mut budget = UptimeBudget::new(1);
        assert!(budget.tick());
    }
}
