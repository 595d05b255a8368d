//! Hardware-independent core library for the environmental beacon
//!
//! This crate contains all platform-agnostic logic for the beacon: the
//! broadcast state record codec, sensor acquisition, the advertising
//! lifecycle, watchdog supervision, the reboot policy and the supervisory
//! loop that ties them together.
//!
//! Every piece of hardware is reached through a collaborator trait
//! ([`SensorDevice`], [`RadioStack`], [`WatchdogDevice`], [`PowerControl`]),
//! so the loop runs unmodified on the ESP32-S3 firmware, in the desktop
//! simulator and under host tests.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod advertising;
pub mod beacon;
pub mod config;
pub mod reboot;
pub mod record;
pub mod sensors;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

pub use advertising::{
    AdvertisingController, AdvertisingParams, AdvertisingState, RadioFault, RadioStack,
};
pub use beacon::{Beacon, BeaconHardware, LoopState, boot};
pub use config::{BeaconConfig, ConfigError, RadioConfig};
pub use reboot::{PowerControl, RebootPolicy, RebootReason, UptimeBudget};
pub use record::{FieldCode, FixedPoint, Quantity, RecordError, StateRecord};
#[cfg(feature = "sensor-sht40")]
pub use sensors::Sht40Device;
pub use sensors::{Readings, SensorChannel, SensorDevice, SensorFault, SensorReader, SensorValue};
pub use watchdog::{
    ChannelId, StarvationHandler, TimeoutConfig, TimeoutFlags, WatchdogDevice, WatchdogFault,
    WatchdogSupervisor,
};
