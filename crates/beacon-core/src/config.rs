//! Beacon configuration.
//!
//! Defaults suit a battery-powered indoor beacon. Builds may override any
//! value through `BEACON_*` keys; the firmware validates the result at build
//! time and embeds it as a postcard blob.

use core::str::FromStr;

use heapless::String;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Longest name that fits a legacy scan response (31 - 2 header bytes).
pub const MAX_DEVICE_NAME_LEN: usize = 29;

/// BLE advertising interval bounds in milliseconds.
pub const MIN_ADV_INTERVAL_MS: u32 = 20;
pub const MAX_ADV_INTERVAL_MS: u32 = 10_240;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown configuration key")]
    UnknownKey,
    #[error("Value is not a valid number")]
    InvalidNumber,
    #[error("Device name longer than 29 bytes")]
    NameTooLong,
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Configuration blob could not be encoded or decoded")]
    Encoding,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioConfig {
    /// Pause between stopping and restarting advertising.
    pub settle_ms: u32,
    pub adv_interval_min_ms: u32,
    pub adv_interval_max_ms: u32,
    /// Bound on waiting for the stack's ready notification.
    pub enable_timeout_ms: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            settle_ms: 200,
            adv_interval_min_ms: 4_000,
            adv_interval_max_ms: 5_000,
            enable_timeout_ms: 10_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BeaconConfig {
    pub device_name: String<MAX_DEVICE_NAME_LEN>,
    pub sample_interval_ms: u32,
    /// Idle sleep slice; one heartbeat is logged per slice.
    pub heartbeat_slice_ms: u32,
    /// Successful cycles before the scheduled reboot.
    pub uptime_cycles: u32,
    pub watchdog_timeout_ms: u32,
    /// Delay between logging a reboot reason and resetting.
    pub reboot_settle_ms: u32,
    pub radio: RadioConfig,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            device_name: String::from_str("EnvBeacon").unwrap_or_default(),
            sample_interval_ms: 2_000,
            heartbeat_slice_ms: 500,
            uptime_cycles: 43_200,
            watchdog_timeout_ms: 3_600_000,
            reboot_settle_ms: 3_000,
            radio: RadioConfig::default(),
        }
    }
}

fn parse_ms(value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidNumber)
}

impl BeaconConfig {
    /// Keys accepted by [`BeaconConfig::apply_override`].
    pub const OVERRIDE_KEYS: [&'static str; 10] = [
        "BEACON_DEVICE_NAME",
        "BEACON_SAMPLE_INTERVAL_MS",
        "BEACON_HEARTBEAT_SLICE_MS",
        "BEACON_UPTIME_CYCLES",
        "BEACON_WATCHDOG_TIMEOUT_MS",
        "BEACON_REBOOT_SETTLE_MS",
        "BEACON_RADIO_SETTLE_MS",
        "BEACON_ADV_INTERVAL_MIN_MS",
        "BEACON_ADV_INTERVAL_MAX_MS",
        "BEACON_RADIO_ENABLE_TIMEOUT_MS",
    ];

    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "BEACON_DEVICE_NAME" => {
                self.device_name =
                    String::from_str(value.trim()).map_err(|_| ConfigError::NameTooLong)?;
            }
            "BEACON_SAMPLE_INTERVAL_MS" => self.sample_interval_ms = parse_ms(value)?,
            "BEACON_HEARTBEAT_SLICE_MS" => self.heartbeat_slice_ms = parse_ms(value)?,
            "BEACON_UPTIME_CYCLES" => self.uptime_cycles = parse_ms(value)?,
            "BEACON_WATCHDOG_TIMEOUT_MS" => self.watchdog_timeout_ms = parse_ms(value)?,
            "BEACON_REBOOT_SETTLE_MS" => self.reboot_settle_ms = parse_ms(value)?,
            "BEACON_RADIO_SETTLE_MS" => self.radio.settle_ms = parse_ms(value)?,
            "BEACON_ADV_INTERVAL_MIN_MS" => self.radio.adv_interval_min_ms = parse_ms(value)?,
            "BEACON_ADV_INTERVAL_MAX_MS" => self.radio.adv_interval_max_ms = parse_ms(value)?,
            "BEACON_RADIO_ENABLE_TIMEOUT_MS" => self.radio.enable_timeout_ms = parse_ms(value)?,
            _ => return Err(ConfigError::UnknownKey),
        }
        Ok(())
    }

    /// Worst-case time for one full cycle including the idle sleep.
    pub fn cycle_budget_ms(&self) -> u64 {
        u64::from(self.sample_interval_ms) + u64::from(self.radio.settle_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() {
            return Err(ConfigError::Invalid("device name is empty"));
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid("sample interval is zero"));
        }
        if self.heartbeat_slice_ms == 0 || self.heartbeat_slice_ms > self.sample_interval_ms {
            return Err(ConfigError::Invalid(
                "heartbeat slice must be within the sample interval",
            ));
        }
        if self.uptime_cycles == 0 {
            return Err(ConfigError::Invalid("uptime bound is zero"));
        }
        if u64::from(self.watchdog_timeout_ms) <= self.cycle_budget_ms() {
            return Err(ConfigError::Invalid(
                "watchdog window shorter than one cycle",
            ));
        }
        let radio = &self.radio;
        if radio.adv_interval_min_ms < MIN_ADV_INTERVAL_MS
            || radio.adv_interval_max_ms > MAX_ADV_INTERVAL_MS
            || radio.adv_interval_min_ms > radio.adv_interval_max_ms
        {
            return Err(ConfigError::Invalid("advertising interval out of range"));
        }
        if radio.enable_timeout_ms == 0 {
            return Err(ConfigError::Invalid("radio enable timeout is zero"));
        }
        Ok(())
    }

    pub fn to_postcard<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], ConfigError> {
        postcard::to_slice(self, buf).map_err(|_| ConfigError::Encoding)
    }

    pub fn from_postcard(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Encoding)?;
        config.validate()?;
        Ok(config)
    }
}
