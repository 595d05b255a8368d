use super::{SensorChannel, SensorDevice, SensorValue};

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::debug;
use sht4x::{Measurement, Precision, Sht4xAsync};

/// SHT40 temperature/humidity sensor.
///
/// `fetch_sample` performs a high precision single-shot measurement and caches
/// it; channel reads are served from that cache until the next fetch.
pub struct Sht40Device<I, D> {
    sensor: Sht4xAsync<I, D>,
    delay: D,
    last: Option<Measurement>,
}

impl<I: I2c, D: DelayNs> Sht40Device<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            sensor: Sht4xAsync::<I, D>::new(i2c),
            delay,
            last: None,
        }
    }
}

#[derive(Debug)]
pub enum Sht40Error<E> {
    Bus(sht4x::Error<E>),
    /// A channel was read before any sample was fetched.
    NoSample,
}

impl<I: I2c, D: DelayNs> SensorDevice for Sht40Device<I, D> {
    type Error = Sht40Error<I::Error>;

    async fn probe(&mut self) -> Result<(), Self::Error> {
        let serial = self
            .sensor
            .serial_number(&mut self.delay)
            .await
            .map_err(Sht40Error::Bus)?;
        debug!("SHT40 serial number {:#010x}", serial);
        Ok(())
    }

    async fn fetch_sample(&mut self) -> Result<(), Self::Error> {
        // A failed fetch must not leave an older sample readable.
        self.last = None;

        let measurement = self
            .sensor
            .measure(Precision::High, &mut self.delay)
            .await
            .map_err(|e| {
                debug!("SHT40 measurement failed: {:?}", e);
                Sht40Error::Bus(e)
            })?;

        self.last = Some(measurement);
        Ok(())
    }

    fn read_channel(&mut self, channel: SensorChannel) -> Result<SensorValue, Self::Error> {
        let measurement = self.last.as_ref().ok_or(Sht40Error::NoSample)?;

        let milli = match channel {
            SensorChannel::AmbientTemperature => measurement.temperature_milli_celsius(),
            SensorChannel::Humidity => measurement.humidity_milli_percent(),
        };

        Ok(SensorValue::from_milli(milli))
    }
}
