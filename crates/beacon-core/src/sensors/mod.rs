#[cfg(feature = "sensor-sht40")]
mod sht40;

use core::fmt::{self, Debug};

use log::{info, warn};
use thiserror_no_std::Error;

#[cfg(feature = "sensor-sht40")]
pub use sht40::{Sht40Device, Sht40Error};

/// Channels the beacon reads from its sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorChannel {
    AmbientTemperature,
    Humidity,
}

impl SensorChannel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AmbientTemperature => "temperature",
            Self::Humidity => "humidity",
        }
    }
}

/// A driver-native fixed-point reading in milli-units (m°C, m%RH).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorValue {
    milli: i32,
}

impl SensorValue {
    pub const fn from_milli(milli: i32) -> Self {
        Self { milli }
    }

    pub const fn milli(self) -> i32 {
        self.milli
    }
}

/// Two decimals, truncated: `-5128` milli-units prints as `-5.12`.
impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.milli < 0 { "-" } else { "" };
        let abs = self.milli.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 1000, (abs % 1000) / 10)
    }
}

/// One complete, successfully acquired sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readings {
    pub temperature: SensorValue,
    pub humidity: SensorValue,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    #[error("Could not get sensor device")]
    NotFound,
    #[error("Sensor sample update error")]
    Fetch,
    #[error("Cannot read {} channel", .0.label())]
    Channel(SensorChannel),
}

/// Sensor driver as seen by the beacon.
///
/// `fetch_sample` triggers a fresh acquisition; `read_channel` returns the
/// value of one channel from the most recent acquisition.
pub trait SensorDevice {
    type Error: Debug;

    /// Check that the device is present and responding.
    fn probe(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    fn fetch_sample(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    fn read_channel(&mut self, channel: SensorChannel) -> Result<SensorValue, Self::Error>;
}

/// Acquires one temperature/humidity sample per call.
///
/// No retries happen here; the caller owns recovery.
pub struct SensorReader<S> {
    device: S,
}

impl<S: SensorDevice> SensorReader<S> {
    /// Bind a device, failing if it does not answer a probe.
    pub async fn bind(mut device: S) -> Result<Self, SensorFault> {
        device.probe().await.map_err(|e| {
            warn!("Sensor probe failed: {:?}", e);
            SensorFault::NotFound
        })?;
        info!("Sensor found");

        Ok(Self { device })
    }

    /// Fetch a sample, then read temperature, then humidity.
    ///
    /// The first failing step short-circuits; nothing is returned for a
    /// partially read sample.
    pub async fn read(&mut self) -> Result<Readings, SensorFault> {
        self.device.fetch_sample().await.map_err(|e| {
            warn!("Sensor sample fetch failed: {:?}", e);
            SensorFault::Fetch
        })?;

        let temperature = self.read_channel(SensorChannel::AmbientTemperature)?;
        let humidity = self.read_channel(SensorChannel::Humidity)?;

        Ok(Readings {
            temperature,
            humidity,
        })
    }

    fn read_channel(&mut self, channel: SensorChannel) -> Result<SensorValue, SensorFault> {
        self.device.read_channel(channel).map_err(|e| {
            warn!("Sensor {} channel read failed: {:?}", channel.label(), e);
            SensorFault::Channel(channel)
        })
    }

    pub fn device(&self) -> &S {
        &self.device
    }
}
