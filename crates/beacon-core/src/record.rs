//! Broadcast state record and its wire codec.
//!
//! The record is carried verbatim as manufacturer specific advertising data,
//! so the layout below is bit-exact and independent of the host:
//!
//! | Offset | Field                 | Type |
//! |--------|-----------------------|------|
//! | 0      | magic                 | u32  |
//! | 4      | version               | u8   |
//! | 5      | serial                | u8   |
//! | 6      | temperature fieldcode | u8   |
//! | 7      | temperature value     | i16  |
//! | 9      | humidity fieldcode    | u8   |
//! | 10     | humidity value        | i16  |
//! | 12     | battery fieldcode     | u8   |
//! | 13     | battery value         | u8   |
//! | 14     | vcc fieldcode         | u8   |
//! | 15     | vcc value             | u8   |
//!
//! All multi-byte fields are little-endian. No padding.

use log::warn;
use thiserror_no_std::Error;

use crate::sensors::{Readings, SensorValue};

/// Identifies the payload format to scanners ("BECN" on the wire).
pub const MAGIC: u32 = 0x4E43_4542;

/// Format revision of the record layout.
pub const VERSION: u8 = 1;

/// Size of the serialized record in bytes.
pub const RECORD_LEN: usize = 16;

/// "No data yet" marker for 8-bit value slots.
pub const NO_DATA_U8: u8 = 0xFF;

/// Scale applied to readings before they go on the wire (two decimals).
pub const SCALE: i32 = 100;

/// Tag describing which physical quantity and scale occupy the following value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCode {
    /// Ambient temperature, degrees Celsius × 100
    Temperature = 0x01,
    /// Relative humidity, percent × 100
    Humidity = 0x02,
    /// Battery level, percent (reserved)
    Battery = 0x03,
    /// Supply voltage, volts × 10 (reserved)
    Vcc = 0x04,
}

impl FieldCode {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A measured quantity that is encoded into a 16-bit fixed-point slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Temperature,
    Humidity,
}

impl Quantity {
    pub const fn field_code(self) -> FieldCode {
        match self {
            Self::Temperature => FieldCode::Temperature,
            Self::Humidity => FieldCode::Humidity,
        }
    }
}

/// Signed 16-bit value scaled by [`SCALE`].
///
/// The bit pattern `0xFFFF` is reserved as the "no data yet" sentinel and is
/// never produced by [`FixedPoint::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPoint(i16);

impl FixedPoint {
    pub const NO_DATA: FixedPoint = FixedPoint(-1);

    /// Convert a driver-native reading into its wire representation.
    ///
    /// Policy: the milli-unit reading is rounded half away from zero to
    /// hundredths, then saturated to the `i16` range. A result that would
    /// collide with the sentinel (-0.01) is stored as `0`.
    pub fn encode(quantity: Quantity, reading: SensorValue) -> Self {
        let milli = i64::from(reading.milli());
        let step = i64::from(1000 / SCALE);
        let half = step / 2;
        let scaled = if milli >= 0 {
            (milli + half) / step
        } else {
            (milli - half) / step
        };

        let clamped = scaled.clamp(i64::from(i16::MIN), i64::from(i16::MAX));
        if clamped != scaled {
            warn!(
                "{:?} reading of {} milli-units is out of range, saturating",
                quantity,
                reading.milli()
            );
        }

        match clamped as i16 {
            -1 => Self(0),
            value => Self(value),
        }
    }

    /// Inverse of [`FixedPoint::encode`]; `None` for the sentinel.
    pub fn decode(self) -> Option<SensorValue> {
        if self.is_no_data() {
            return None;
        }
        Some(SensorValue::from_milli(i32::from(self.0) * (1000 / SCALE)))
    }

    pub const fn from_raw(raw: i16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i16 {
        self.0
    }

    pub const fn is_no_data(self) -> bool {
        self.0 == Self::NO_DATA.0
    }
}

/// Errors produced while decoding a received payload.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    #[error("Payload must be 16 bytes, got {0}")]
    Length(usize),
    #[error("Unknown payload magic {0:#010x}")]
    Magic(u32),
    #[error("Unsupported record version {0}")]
    Version(u8),
}

/// The state broadcast by the beacon.
///
/// Created with sentinel values at boot, mutated in place once per cycle by
/// the supervisory loop and never persisted across a reboot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRecord {
    serial: u8,
    temperature: FixedPoint,
    humidity: FixedPoint,
    battery: u8,
    vcc: u8,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl StateRecord {
    /// A fresh record: serial zero and every value slot at its sentinel.
    pub const fn new() -> Self {
        Self {
            serial: 0,
            temperature: FixedPoint::NO_DATA,
            humidity: FixedPoint::NO_DATA,
            battery: NO_DATA_U8,
            vcc: NO_DATA_U8,
        }
    }

    pub const fn serial(&self) -> u8 {
        self.serial
    }

    pub const fn temperature(&self) -> FixedPoint {
        self.temperature
    }

    pub const fn humidity(&self) -> FixedPoint {
        self.humidity
    }

    pub const fn battery(&self) -> u8 {
        self.battery
    }

    pub const fn vcc(&self) -> u8 {
        self.vcc
    }

    /// Store a complete, successfully decoded sample.
    pub fn apply(&mut self, readings: &Readings) {
        self.temperature = FixedPoint::encode(Quantity::Temperature, readings.temperature);
        self.humidity = FixedPoint::encode(Quantity::Humidity, readings.humidity);
    }

    /// Advance the broadcast serial, wrapping at 256.
    pub fn advance_serial(&mut self) -> u8 {
        self.serial = self.serial.wrapping_add(1);
        self.serial
    }

    /// Converts the record to its packed little-endian wire form.
    pub fn serialize(&self) -> [u8; RECORD_LEN] {
        let mut bytes = [0u8; RECORD_LEN];

        bytes[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        bytes[4] = VERSION;
        bytes[5] = self.serial;
        bytes[6] = FieldCode::Temperature.as_u8();
        bytes[7..9].copy_from_slice(&self.temperature.raw().to_le_bytes());
        bytes[9] = FieldCode::Humidity.as_u8();
        bytes[10..12].copy_from_slice(&self.humidity.raw().to_le_bytes());
        bytes[12] = FieldCode::Battery.as_u8();
        bytes[13] = self.battery;
        bytes[14] = FieldCode::Vcc.as_u8();
        bytes[15] = self.vcc;

        bytes
    }

    /// Decodes a payload as a scanner would.
    ///
    /// Field codes are not checked; they are fixed per version.
    pub fn parse(bytes: &[u8]) -> Result<Self, RecordError> {
        let bytes: &[u8; RECORD_LEN] = bytes
            .try_into()
            .map_err(|_| RecordError::Length(bytes.len()))?;

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != MAGIC {
            return Err(RecordError::Magic(magic));
        }
        if bytes[4] != VERSION {
            return Err(RecordError::Version(bytes[4]));
        }

        Ok(Self {
            serial: bytes[5],
            temperature: FixedPoint(i16::from_le_bytes([bytes[7], bytes[8]])),
            humidity: FixedPoint(i16::from_le_bytes([bytes[10], bytes[11]])),
            battery: bytes[13],
            vcc: bytes[15],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(milli: i32) -> SensorValue {
        SensorValue::from_milli(milli)
    }

    #[test]
    fn test_fresh_record_layout() {
        let bytes = StateRecord::new().serialize();

        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], b"BECN");
        assert_eq!(bytes[4], VERSION);
        assert_eq!(bytes[5], 0);
        assert_eq!(bytes[6], 0x01);
        assert_eq!(&bytes[7..9], &[0xFF, 0xFF]);
        assert_eq!(bytes[9], 0x02);
        assert_eq!(&bytes[10..12], &[0xFF, 0xFF]);
        assert_eq!(&bytes[12..16], &[0x03, 0xFF, 0x04, 0xFF]);
    }

    #[test]
    fn test_apply_writes_little_endian_values() {
        let mut record = StateRecord::new();
        record.apply(&Readings {
            temperature: reading(21_370),
            humidity: reading(55_120),
        });
        record.advance_serial();

        let bytes = record.serialize();
        assert_eq!(i16::from_le_bytes([bytes[7], bytes[8]]), 2137);
        assert_eq!(i16::from_le_bytes([bytes[10], bytes[11]]), 5512);
        assert_eq!(bytes[5], 1);
    }

    #[test]
    fn test_encode_rounds_half_away_from_zero() {
        assert_eq!(FixedPoint::encode(Quantity::Temperature, reading(21_374)).raw(), 2137);
        assert_eq!(FixedPoint::encode(Quantity::Temperature, reading(21_375)).raw(), 2138);
        assert_eq!(FixedPoint::encode(Quantity::Temperature, reading(-21_374)).raw(), -2137);
        assert_eq!(FixedPoint::encode(Quantity::Temperature, reading(-21_375)).raw(), -2138);
        assert_eq!(FixedPoint::encode(Quantity::Humidity, reading(4)).raw(), 0);
        assert_eq!(FixedPoint::encode(Quantity::Humidity, reading(5)).raw(), 1);
    }

    #[test]
    fn test_encode_saturates() {
        assert_eq!(
            FixedPoint::encode(Quantity::Temperature, reading(400_000)).raw(),
            i16::MAX
        );
        assert_eq!(
            FixedPoint::encode(Quantity::Temperature, reading(-400_000)).raw(),
            i16::MIN
        );
        assert_eq!(
            FixedPoint::encode(Quantity::Temperature, reading(i32::MIN)).raw(),
            i16::MIN
        );
    }

    #[test]
    fn test_encode_never_yields_sentinel() {
        for milli in [-14, -10, -6, -5] {
            let encoded = FixedPoint::encode(Quantity::Temperature, reading(milli));
            assert!(!encoded.is_no_data(), "{} encoded to the sentinel", milli);
            assert_eq!(encoded.raw(), 0);
        }
        assert_eq!(FixedPoint::encode(Quantity::Temperature, reading(-15)).raw(), -2);
    }

    #[test]
    fn test_decode_within_one_hundredth() {
        let mut milli = -300_000;
        while milli <= 300_000 {
            let decoded = FixedPoint::encode(Quantity::Temperature, reading(milli))
                .decode()
                .unwrap();
            assert!(
                (decoded.milli() - milli).abs() <= 10,
                "{} decoded as {}",
                milli,
                decoded.milli()
            );
            milli += 997;
        }
        assert_eq!(FixedPoint::NO_DATA.decode(), None);
    }

    #[test]
    fn test_serial_wraps() {
        let mut record = StateRecord::new();
        for expected in 1..=255u8 {
            assert_eq!(record.advance_serial(), expected);
        }
        assert_eq!(record.advance_serial(), 0);
        assert_eq!(record.advance_serial(), 1);
    }

    #[test]
    fn test_parse_matches_serialize() {
        let mut record = StateRecord::new();
        record.apply(&Readings {
            temperature: reading(-5_250),
            humidity: reading(99_990),
        });
        record.advance_serial();

        let parsed = StateRecord::parse(&record.serialize()).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.temperature().raw(), -525);
        assert_eq!(parsed.battery(), NO_DATA_U8);
    }

    #[test]
    fn test_parse_rejects_foreign_payloads() {
        let mut bytes = StateRecord::new().serialize();

        assert_eq!(
            StateRecord::parse(&bytes[..15]),
            Err(RecordError::Length(15))
        );

        bytes[4] = 9;
        assert_eq!(StateRecord::parse(&bytes), Err(RecordError::Version(9)));

        bytes[0] = 0;
        assert!(matches!(
            StateRecord::parse(&bytes),
            Err(RecordError::Magic(_))
        ));
    }
}
