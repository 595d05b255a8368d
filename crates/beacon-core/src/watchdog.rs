//! Hardware watchdog supervision.
//!
//! The watchdog only exists to catch total lockups (a bus transaction that
//! never returns, a wedged radio stack). Its window is long compared to the
//! sample cycle; ordinary faults go through the reboot policy instead.

use core::fmt::Debug;

use log::{info, warn};
use thiserror_no_std::Error;

/// Handle of an installed timeout channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelId(pub u8);

/// Invoked from outside the main loop when the watchdog starves.
///
/// Must not touch any loop-owned state; the loop may be what is stuck.
pub type StarvationHandler = fn() -> !;

/// What the hardware does on expiry, independent of the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutFlags {
    /// Reset the whole SoC.
    ResetSoc,
    /// Reset only the CPU core.
    ResetCpuCore,
    /// Take no hardware action; the callback is the only recovery.
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub window_max_ms: u32,
    pub flags: TimeoutFlags,
    pub callback: Option<StarvationHandler>,
}

/// Watchdog peripheral as seen by the beacon.
pub trait WatchdogDevice {
    type Error: Debug;

    fn install_timeout(&mut self, config: TimeoutConfig) -> Result<ChannelId, Self::Error>;

    /// Start the watchdog with the installed timeouts.
    fn setup(&mut self) -> Result<(), Self::Error>;

    fn feed(&mut self, channel: ChannelId) -> Result<(), Self::Error>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogFault {
    #[error("Watchdog timeout install error")]
    Install,
    #[error("Watchdog setup error")]
    Setup,
    #[error("Watchdog feed error")]
    Feed,
    #[error("Watchdog fed before it was armed")]
    NotArmed,
}

pub struct WatchdogSupervisor<W> {
    device: W,
    on_starvation: StarvationHandler,
    channel: Option<ChannelId>,
}

impl<W: WatchdogDevice> WatchdogSupervisor<W> {
    pub fn new(device: W, on_starvation: StarvationHandler) -> Self {
        Self {
            device,
            on_starvation,
            channel: None,
        }
    }

    /// Install a single SoC-resetting timeout channel and start the watchdog.
    ///
    /// The starvation handler is registered as well so a reset still happens
    /// on platforms that ignore the reset flag.
    pub fn arm(&mut self, timeout_ms: u32) -> Result<ChannelId, WatchdogFault> {
        let channel = self
            .device
            .install_timeout(TimeoutConfig {
                window_max_ms: timeout_ms,
                flags: TimeoutFlags::ResetSoc,
                callback: Some(self.on_starvation),
            })
            .map_err(|e| {
                warn!("Watchdog install error: {:?}", e);
                WatchdogFault::Install
            })?;

        self.device.setup().map_err(|e| {
            warn!("Watchdog setup error: {:?}", e);
            WatchdogFault::Setup
        })?;

        info!("Watchdog armed: {} ms window on channel {}", timeout_ms, channel.0);
        self.channel = Some(channel);
        Ok(channel)
    }

    pub fn feed(&mut self, channel: ChannelId) -> Result<(), WatchdogFault> {
        if self.channel != Some(channel) {
            warn!("Watchdog channel {} is not armed", channel.0);
            return Err(WatchdogFault::NotArmed);
        }

        self.device.feed(channel).map_err(|e| {
            warn!("Watchdog feed error: {:?}", e);
            WatchdogFault::Feed
        })
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn device(&self) -> &W {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, EventLog, MockWatchdog, panic_on_starvation};

    #[test]
    fn test_arm_installs_resetting_channel_with_handler() {
        let log = EventLog::default();
        let mut watchdog = WatchdogSupervisor::new(MockWatchdog::new(&log), panic_on_starvation);

        let channel = watchdog.arm(3_600_000).unwrap();

        assert_eq!(watchdog.channel(), Some(channel));
        assert_eq!(log.events(), [Event::Install(3_600_000), Event::Setup]);
        let installed = watchdog.device().installed().unwrap();
        assert_eq!(installed.flags, TimeoutFlags::ResetSoc);
        assert!(installed.callback.is_some());
    }

    #[test]
    fn test_install_failure() {
        let log = EventLog::default();
        let mut watchdog =
            WatchdogSupervisor::new(MockWatchdog::new(&log).with_install_error(), panic_on_starvation);

        assert_eq!(watchdog.arm(1_000), Err(WatchdogFault::Install));
        assert_eq!(watchdog.channel(), None);
        assert!(!log.events().contains(&Event::Setup));
    }

    #[test]
    fn test_setup_failure() {
        let log = EventLog::default();
        let mut watchdog =
            WatchdogSupervisor::new(MockWatchdog::new(&log).with_setup_error(), panic_on_starvation);

        assert_eq!(watchdog.arm(1_000), Err(WatchdogFault::Setup));
        assert_eq!(watchdog.channel(), None);
    }

    #[test]
    fn test_feed_requires_arm() {
        let log = EventLog::default();
        let mut watchdog = WatchdogSupervisor::new(MockWatchdog::new(&log), panic_on_starvation);

        assert_eq!(watchdog.feed(ChannelId(0)), Err(WatchdogFault::NotArmed));
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_feed_failure() {
        let log = EventLog::default();
        let mut watchdog =
            WatchdogSupervisor::new(MockWatchdog::new(&log).with_feed_error(), panic_on_starvation);
        let channel = watchdog.arm(1_000).unwrap();

        assert_eq!(watchdog.feed(channel), Err(WatchdogFault::Feed));
    }

    #[test]
    #[should_panic(expected = "watchdog starved")]
    fn test_starvation_handler_forces_reset() {
        let log = EventLog::default();
        let mut watchdog = WatchdogSupervisor::new(MockWatchdog::new(&log), panic_on_starvation);
        watchdog.arm(1_000).unwrap();

        watchdog.device().expire();
    }
}
