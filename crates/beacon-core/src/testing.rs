//! Recording mocks for the collaborator traits.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::advertising::{AdvertisingParams, RadioStack};
use crate::reboot::PowerControl;
use crate::record::RECORD_LEN;
use crate::sensors::{SensorChannel, SensorDevice, SensorValue};
use crate::watchdog::{ChannelId, TimeoutConfig, WatchdogDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Probe,
    Fetch,
    ReadChannel(SensorChannel),
    Enable,
    AdvStop,
    AdvStart([u8; RECORD_LEN]),
    Install(u32),
    Setup,
    Feed(ChannelId),
    Sleep(u32),
    ColdReset,
}

/// Shared, ordered log of every collaborator call.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

pub fn panic_on_starvation() -> ! {
    panic!("watchdog starved")
}

pub struct MockSensor {
    log: EventLog,
    present: bool,
    sample: (i32, i32),
    fetches: u32,
    fetch_error: bool,
    fetch_error_on: Option<u32>,
    channel_error: Option<SensorChannel>,
    channel_error_on: Option<(u32, SensorChannel)>,
}

impl MockSensor {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            present: true,
            sample: (20_000, 50_000),
            fetches: 0,
            fetch_error: false,
            fetch_error_on: None,
            channel_error: None,
            channel_error_on: None,
        }
    }

    pub fn with_sample(mut self, temperature_milli: i32, humidity_milli: i32) -> Self {
        self.sample = (temperature_milli, humidity_milli);
        self
    }

    pub fn with_fetch_error(mut self) -> Self {
        self.fetch_error = true;
        self
    }

    /// Fail the `n`th fetch (1-based).
    pub fn with_fetch_error_on(mut self, n: u32) -> Self {
        self.fetch_error_on = Some(n);
        self
    }

    pub fn with_channel_error(mut self, channel: SensorChannel) -> Self {
        self.channel_error = Some(channel);
        self
    }

    /// Fail reads of `channel` after the `n`th fetch.
    pub fn with_channel_error_on(mut self, n: u32, channel: SensorChannel) -> Self {
        self.channel_error_on = Some((n, channel));
        self
    }

    pub fn missing(mut self) -> Self {
        self.present = false;
        self
    }
}

impl SensorDevice for MockSensor {
    type Error = MockError;

    async fn probe(&mut self) -> Result<(), MockError> {
        self.log.push(Event::Probe);
        if self.present { Ok(()) } else { Err(MockError) }
    }

    async fn fetch_sample(&mut self) -> Result<(), MockError> {
        self.log.push(Event::Fetch);
        self.fetches += 1;
        if self.fetch_error || self.fetch_error_on == Some(self.fetches) {
            return Err(MockError);
        }
        Ok(())
    }

    fn read_channel(&mut self, channel: SensorChannel) -> Result<SensorValue, MockError> {
        self.log.push(Event::ReadChannel(channel));
        if self.channel_error == Some(channel)
            || self.channel_error_on == Some((self.fetches, channel))
        {
            return Err(MockError);
        }
        let milli = match channel {
            SensorChannel::AmbientTemperature => self.sample.0,
            SensorChannel::Humidity => self.sample.1,
        };
        Ok(SensorValue::from_milli(milli))
    }
}

pub struct MockRadio {
    log: EventLog,
    enable_error: bool,
    never_ready: bool,
    stop_error: bool,
    start_error: bool,
    last_params: Option<AdvertisingParams>,
}

impl MockRadio {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            enable_error: false,
            never_ready: false,
            stop_error: false,
            start_error: false,
            last_params: None,
        }
    }

    pub fn with_enable_error(mut self) -> Self {
        self.enable_error = true;
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    pub fn with_stop_error(mut self) -> Self {
        self.stop_error = true;
        self
    }

    pub fn with_start_error(mut self) -> Self {
        self.start_error = true;
        self
    }

    pub fn last_params(&self) -> Option<AdvertisingParams> {
        self.last_params
    }
}

impl RadioStack for MockRadio {
    type Error = MockError;

    async fn enable(&mut self) -> Result<(), MockError> {
        self.log.push(Event::Enable);
        if self.never_ready {
            core::future::pending::<()>().await;
        }
        if self.enable_error { Err(MockError) } else { Ok(()) }
    }

    async fn advertising_stop(&mut self) -> Result<(), MockError> {
        self.log.push(Event::AdvStop);
        if self.stop_error { Err(MockError) } else { Ok(()) }
    }

    async fn advertising_start(
        &mut self,
        params: &AdvertisingParams,
        ad: &[u8],
        _scan_response: &[u8],
    ) -> Result<(), MockError> {
        // Flags (3 bytes) then the manufacturer data header (2 bytes).
        let mut payload = [0u8; RECORD_LEN];
        payload.copy_from_slice(&ad[5..5 + RECORD_LEN]);
        self.log.push(Event::AdvStart(payload));
        self.last_params = Some(*params);
        if self.start_error { Err(MockError) } else { Ok(()) }
    }
}

pub struct MockWatchdog {
    log: EventLog,
    install_error: bool,
    setup_error: bool,
    feed_error: bool,
    installed: Option<TimeoutConfig>,
}

impl MockWatchdog {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            install_error: false,
            setup_error: false,
            feed_error: false,
            installed: None,
        }
    }

    pub fn with_install_error(mut self) -> Self {
        self.install_error = true;
        self
    }

    pub fn with_setup_error(mut self) -> Self {
        self.setup_error = true;
        self
    }

    pub fn with_feed_error(mut self) -> Self {
        self.feed_error = true;
        self
    }

    pub fn installed(&self) -> Option<TimeoutConfig> {
        self.installed
    }

    /// Simulate the window elapsing without a feed.
    pub fn expire(&self) -> ! {
        match self.installed.and_then(|config| config.callback) {
            Some(callback) => callback(),
            None => panic!("watchdog expired without a handler"),
        }
    }
}

impl WatchdogDevice for MockWatchdog {
    type Error = MockError;

    fn install_timeout(&mut self, config: TimeoutConfig) -> Result<ChannelId, MockError> {
        self.log.push(Event::Install(config.window_max_ms));
        if self.install_error {
            return Err(MockError);
        }
        self.installed = Some(config);
        Ok(ChannelId(0))
    }

    fn setup(&mut self) -> Result<(), MockError> {
        self.log.push(Event::Setup);
        if self.setup_error { Err(MockError) } else { Ok(()) }
    }

    fn feed(&mut self, channel: ChannelId) -> Result<(), MockError> {
        self.log.push(Event::Feed(channel));
        if self.feed_error { Err(MockError) } else { Ok(()) }
    }
}

/// Returns immediately, recording each requested sleep.
#[derive(Clone)]
pub struct MockDelay {
    log: EventLog,
}

impl MockDelay {
    pub fn new(log: &EventLog) -> Self {
        Self { log: log.clone() }
    }
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.log.push(Event::Sleep(ns / 1_000_000));
    }

    async fn delay_us(&mut self, us: u32) {
        self.log.push(Event::Sleep(us / 1_000));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.log.push(Event::Sleep(ms));
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.log.push(Event::Sleep(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.log.push(Event::Sleep(ms));
    }
}

pub struct MockPower {
    log: EventLog,
}

impl MockPower {
    pub fn new(log: &EventLog) -> Self {
        Self { log: log.clone() }
    }
}

impl PowerControl for MockPower {
    fn cold_reset(&mut self) -> ! {
        self.log.push(Event::ColdReset);
        panic!("cold reset")
    }
}
