//! ESP32-S3 collaborators for the environmental beacon
//!
//! This crate contains the hardware-specific implementations of the
//! `beacon-core` collaborator traits: the SHT40 on the I2C bus, BLE
//! advertising through `esp-radio` and `trouble-host`, the RTC watchdog and
//! the software reset used as the cold reset.

#![no_std]

pub mod config;
pub mod hardware;
pub mod power;
pub mod radio;
pub mod watchdog;
