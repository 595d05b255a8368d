//! RTC watchdog with an interrupt-driven starvation handler.
//!
//! Stage 0 raises an interrupt that runs the registered handler; stage 1
//! performs the hardware reset selected by the timeout flags in case the
//! handler itself cannot run.

use core::cell::Cell;

use beacon_core::{ChannelId, StarvationHandler, TimeoutConfig, TimeoutFlags, WatchdogDevice};
use critical_section::Mutex;
use esp_hal::handler;
use esp_hal::rtc_cntl::{Rtc, RwdtStage, RwdtStageAction};
use esp_hal::system::software_reset;
use esp_hal::time::Duration;
use log::error;

/// Time stage 0's handler gets before the hardware reset fires.
const RESET_GRACE: Duration = Duration::from_millis(1_000);

static STARVATION_HANDLER: Mutex<Cell<Option<StarvationHandler>>> = Mutex::new(Cell::new(None));

#[handler]
fn rwdt_interrupt() {
    match critical_section::with(|cs| STARVATION_HANDLER.borrow(cs).get()) {
        Some(on_starvation) => on_starvation(),
        None => software_reset(),
    }
}

/// Default starvation handler for the firmware.
pub fn on_starvation() -> ! {
    error!("Watchdog starved, forcing reset");
    software_reset()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcWatchdogError {
    /// The RTC watchdog has a single channel.
    AlreadyInstalled,
    NotInstalled,
}

pub struct RtcWatchdog<'d> {
    rtc: Rtc<'d>,
    installed: Option<TimeoutConfig>,
}

impl<'d> RtcWatchdog<'d> {
    pub fn new(rtc: Rtc<'d>) -> Self {
        Self {
            rtc,
            installed: None,
        }
    }
}

fn reset_action(flags: TimeoutFlags) -> RwdtStageAction {
    match flags {
        TimeoutFlags::ResetSoc => RwdtStageAction::ResetSystem,
        TimeoutFlags::ResetCpuCore => RwdtStageAction::ResetCpu,
        TimeoutFlags::None => RwdtStageAction::Off,
    }
}

impl WatchdogDevice for RtcWatchdog<'_> {
    type Error = RtcWatchdogError;

    fn install_timeout(&mut self, config: TimeoutConfig) -> Result<ChannelId, RtcWatchdogError> {
        if self.installed.is_some() {
            return Err(RtcWatchdogError::AlreadyInstalled);
        }

        let rwdt = &mut self.rtc.rwdt;
        let window = Duration::from_millis(config.window_max_ms.into());

        match config.callback {
            Some(callback) => {
                critical_section::with(|cs| STARVATION_HANDLER.borrow(cs).set(Some(callback)));
                rwdt.set_timeout(RwdtStage::Stage0, window);
                rwdt.set_stage_action(RwdtStage::Stage0, RwdtStageAction::Interrupt);
                rwdt.set_timeout(RwdtStage::Stage1, RESET_GRACE);
                rwdt.set_stage_action(RwdtStage::Stage1, reset_action(config.flags));
            }
            None => {
                rwdt.set_timeout(RwdtStage::Stage0, window);
                rwdt.set_stage_action(RwdtStage::Stage0, reset_action(config.flags));
            }
        }

        self.installed = Some(config);
        Ok(ChannelId(0))
    }

    fn setup(&mut self) -> Result<(), RtcWatchdogError> {
        let config = self.installed.ok_or(RtcWatchdogError::NotInstalled)?;

        if config.callback.is_some() {
            self.rtc.set_interrupt_handler(rwdt_interrupt);
            self.rtc.rwdt.listen();
        }
        self.rtc.rwdt.enable();
        self.rtc.rwdt.feed();
        Ok(())
    }

    fn feed(&mut self, _channel: ChannelId) -> Result<(), RtcWatchdogError> {
        if self.installed.is_none() {
            return Err(RtcWatchdogError::NotInstalled);
        }
        self.rtc.rwdt.feed();
        Ok(())
    }
}
