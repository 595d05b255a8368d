//! Desktop simulator for the environmental BLE beacon.
//!
//! Runs the unmodified supervisory loop from `beacon-core` against simulated
//! collaborators. The simulated radio doubles as a passive scanner: every
//! payload handed to it is decoded back into a state record and logged.
//!
//! # Environment
//!
//! | Variable                        | Effect                                        |
//! |---------------------------------|-----------------------------------------------|
//! | `RUST_LOG`                      | Log level (default `info`)                    |
//! | `BEACON_*`                      | Configuration overrides, see `OVERRIDE_KEYS`  |
//! | `BEACON_SIM_SENSOR_FAIL_AFTER`  | Fail the sample fetch after N good fetches    |
//! | `BEACON_SIM_MAX_BOOTS`          | Power cycles before the simulator exits (3)   |
//!
//! A cold reset re-executes the simulator binary with an incremented boot
//! counter, so each boot starts from a fresh process like the real device.

use std::env;
use std::process;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use beacon_core::advertising::{AD_TYPE_MANUFACTURER_DATA, AdvertisingParams, RadioStack};
use beacon_core::watchdog::{ChannelId, TimeoutConfig, WatchdogDevice};
use beacon_core::{
    BeaconConfig, BeaconHardware, PowerControl, RebootPolicy, SensorChannel, SensorDevice,
    SensorValue, StateRecord, boot,
};
use log::{error, info, warn};

/// Boot counter handed to the re-executed process.
const BOOT_ENV: &str = "BEACON_SIM_BOOT";
const MAX_BOOTS_ENV: &str = "BEACON_SIM_MAX_BOOTS";
const FAIL_AFTER_ENV: &str = "BEACON_SIM_SENSOR_FAIL_AFTER";

const DEFAULT_MAX_BOOTS: u32 = 3;

/// How often the watchdog thread checks for starvation.
const WATCHDOG_POLL: Duration = Duration::from_millis(100);

/// Simulated time for the radio to report ready.
const RADIO_READY_DELAY: Duration = Duration::from_millis(50);

fn env_number<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Blocks the calling thread; the simulator has a single task.
#[derive(Clone, Copy)]
struct StdDelay;

impl embedded_hal_async::delay::DelayNs for StdDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    async fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

impl embedded_hal::delay::DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

// ---------------------------------------------------------------------------
// Sensor
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum SimFault {
    /// Injected through `BEACON_SIM_SENSOR_FAIL_AFTER`.
    InjectedFetch,
    NoSample,
}

/// Generates synthetic temperature and humidity that vary over time.
struct SimSensor {
    started: Instant,
    fetches: u32,
    fail_after: Option<u32>,
    sample: Option<(i32, i32)>,
}

impl SimSensor {
    fn new(fail_after: Option<u32>) -> Self {
        Self {
            started: Instant::now(),
            fetches: 0,
            fail_after,
            sample: None,
        }
    }

    fn generate(&self) -> (i32, i32) {
        let t = self.started.elapsed().as_secs_f64();

        // Temperature: 20-26 °C sinusoidal with slow drift
        let temperature = 23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos();

        // Humidity: 40-60 % with a different period
        let humidity = 50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos();

        ((temperature * 1000.0) as i32, (humidity * 1000.0) as i32)
    }
}

impl SensorDevice for SimSensor {
    type Error = SimFault;

    async fn probe(&mut self) -> Result<(), SimFault> {
        Ok(())
    }

    async fn fetch_sample(&mut self) -> Result<(), SimFault> {
        self.sample = None;
        if self.fail_after.is_some_and(|limit| self.fetches >= limit) {
            return Err(SimFault::InjectedFetch);
        }
        self.fetches += 1;
        self.sample = Some(self.generate());
        Ok(())
    }

    fn read_channel(&mut self, channel: SensorChannel) -> Result<SensorValue, SimFault> {
        let (temperature, humidity) = self.sample.ok_or(SimFault::NoSample)?;
        let milli = match channel {
            SensorChannel::AmbientTemperature => temperature,
            SensorChannel::Humidity => humidity,
        };
        Ok(SensorValue::from_milli(milli))
    }
}

// ---------------------------------------------------------------------------
// Radio and scanner
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum SimRadioError {
    NotEnabled,
    AlreadyAdvertising,
}

/// Accepts advertising requests and decodes each payload as a scanner would.
#[derive(Default)]
struct SimRadio {
    enabled: bool,
    advertising: bool,
}

/// Find the manufacturer-specific data in a raw advertising buffer.
fn manufacturer_data(mut ad: &[u8]) -> Option<&[u8]> {
    while let [len, rest @ ..] = ad {
        let len = usize::from(*len);
        if len == 0 || rest.len() < len {
            return None;
        }
        let (structure, tail) = rest.split_at(len);
        if structure[0] == AD_TYPE_MANUFACTURER_DATA {
            return Some(&structure[1..]);
        }
        ad = tail;
    }
    None
}

fn scan(ad: &[u8]) {
    let Some(payload) = manufacturer_data(ad) else {
        warn!("Scanner: no manufacturer data in advertisement");
        return;
    };

    match StateRecord::parse(payload) {
        Ok(record) => {
            let show = |value: Option<SensorValue>| match value {
                Some(value) => value.to_string(),
                None => "--".to_string(),
            };
            info!(
                "Scanner: serial {} temp {} C rH {}% battery {:#04x} vcc {:#04x}",
                record.serial(),
                show(record.temperature().decode()),
                show(record.humidity().decode()),
                record.battery(),
                record.vcc()
            );
        }
        Err(e) => warn!("Scanner: undecodable payload: {}", e),
    }
}

impl RadioStack for SimRadio {
    type Error = SimRadioError;

    async fn enable(&mut self) -> Result<(), SimRadioError> {
        thread::sleep(RADIO_READY_DELAY);
        self.enabled = true;
        Ok(())
    }

    async fn advertising_stop(&mut self) -> Result<(), SimRadioError> {
        self.advertising = false;
        Ok(())
    }

    async fn advertising_start(
        &mut self,
        params: &AdvertisingParams,
        ad: &[u8],
        _scan_response: &[u8],
    ) -> Result<(), SimRadioError> {
        if !self.enabled {
            return Err(SimRadioError::NotEnabled);
        }
        if self.advertising {
            return Err(SimRadioError::AlreadyAdvertising);
        }
        self.advertising = true;
        log::debug!(
            "Advertising every {}-{} ms",
            params.interval_min_ms,
            params.interval_max_ms
        );
        scan(ad);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum SimWatchdogError {
    NotInstalled,
    AlreadyRunning,
}

/// A monitor thread that invokes the starvation handler once the window
/// passes without a feed.
#[derive(Default)]
struct ThreadWatchdog {
    config: Option<TimeoutConfig>,
    last_feed: Arc<Mutex<Option<Instant>>>,
    running: bool,
}

impl WatchdogDevice for ThreadWatchdog {
    type Error = SimWatchdogError;

    fn install_timeout(&mut self, config: TimeoutConfig) -> Result<ChannelId, SimWatchdogError> {
        self.config = Some(config);
        Ok(ChannelId(0))
    }

    fn setup(&mut self) -> Result<(), SimWatchdogError> {
        let config = self.config.ok_or(SimWatchdogError::NotInstalled)?;
        if self.running {
            return Err(SimWatchdogError::AlreadyRunning);
        }

        let window = Duration::from_millis(u64::from(config.window_max_ms));
        let last_feed = Arc::clone(&self.last_feed);
        if let Ok(mut fed) = last_feed.lock() {
            *fed = Some(Instant::now());
        }

        thread::spawn(move || {
            loop {
                thread::sleep(WATCHDOG_POLL);
                let starved = last_feed
                    .lock()
                    .map(|fed| fed.is_some_and(|at| at.elapsed() > window))
                    .unwrap_or(true);
                if starved {
                    match config.callback {
                        Some(callback) => callback(),
                        None => {
                            error!("Watchdog starved with no handler");
                            process::abort();
                        }
                    }
                }
            }
        });

        self.running = true;
        Ok(())
    }

    fn feed(&mut self, _channel: ChannelId) -> Result<(), SimWatchdogError> {
        if let Ok(mut fed) = self.last_feed.lock() {
            *fed = Some(Instant::now());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Power
// ---------------------------------------------------------------------------

/// Start a fresh simulator process, or exit once the boot limit is reached.
fn power_cycle() -> ! {
    let boot = env_number::<u32>(BOOT_ENV).unwrap_or(1);
    let max_boots = env_number::<u32>(MAX_BOOTS_ENV).unwrap_or(DEFAULT_MAX_BOOTS);
    if boot >= max_boots {
        info!("Boot limit of {} reached, simulator exiting", max_boots);
        process::exit(0);
    }

    let exe = match env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            error!("Cannot locate simulator binary: {}", e);
            process::exit(1);
        }
    };

    let mut command = process::Command::new(exe);
    command
        .args(env::args_os().skip(1))
        .env(BOOT_ENV, (boot + 1).to_string());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let e = command.exec();
        error!("Cold reset failed: {}", e);
        process::exit(1);
    }

    #[cfg(not(unix))]
    match command.status() {
        Ok(status) => process::exit(status.code().unwrap_or(1)),
        Err(e) => {
            error!("Cold reset failed: {}", e);
            process::exit(1);
        }
    }
}

struct SimPower;

impl PowerControl for SimPower {
    fn cold_reset(&mut self) -> ! {
        power_cycle()
    }
}

fn on_starvation() -> ! {
    error!("Watchdog starved, forcing reset");
    power_cycle()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn load_config() -> BeaconConfig {
    let mut config = BeaconConfig::default();

    for key in BeaconConfig::OVERRIDE_KEYS {
        if let Ok(value) = env::var(key)
            && let Err(e) = config.apply_override(key, &value)
        {
            error!("{}={:?}: {}", key, value, e);
            process::exit(2);
        }
    }

    if let Err(e) = config.validate() {
        error!("{}", e);
        process::exit(2);
    }

    config
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let boot_count = env_number::<u32>(BOOT_ENV).unwrap_or(1);
    info!("Starting beacon simulator (boot {})", boot_count);

    let config = load_config();
    let settle_ms = config.reboot_settle_ms;

    let hardware = BeaconHardware {
        sensor: SimSensor::new(env_number(FAIL_AFTER_ENV)),
        radio: SimRadio::default(),
        watchdog: ThreadWatchdog::default(),
        on_starvation,
    };

    let reason = embassy_futures::block_on(boot(config, hardware, StdDelay));

    RebootPolicy::new(SimPower, StdDelay, settle_ms).reboot(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::advertising::advertising_data;

    #[test]
    fn test_manufacturer_data_is_found_after_flags() {
        let mut record = StateRecord::new();
        record.advance_serial();
        let payload = record.serialize();
        let ad = advertising_data(&payload).unwrap();

        assert_eq!(manufacturer_data(&ad), Some(&payload[..]));
    }

    #[test]
    fn test_truncated_advertisement_is_rejected() {
        assert_eq!(manufacturer_data(&[0x05, 0xFF, 0x01]), None);
        assert_eq!(manufacturer_data(&[]), None);
    }

    #[test]
    fn test_injected_sensor_failure() {
        let mut sensor = SimSensor::new(Some(1));

        assert!(embassy_futures::block_on(sensor.fetch_sample()).is_ok());
        assert!(sensor.read_channel(SensorChannel::Humidity).is_ok());
        assert!(embassy_futures::block_on(sensor.fetch_sample()).is_err());
        assert!(sensor.read_channel(SensorChannel::Humidity).is_err());
    }
}
