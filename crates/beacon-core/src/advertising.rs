//! Advertising lifecycle: bring-up, then stop/settle/start on every update.

use core::fmt::Debug;

use embassy_futures::select::{Either, select};
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::config::RadioConfig;
use crate::record::{RECORD_LEN, StateRecord};

/// Legacy advertising / scan response data limit.
pub const MAX_AD_LEN: usize = 31;

pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

pub const LE_GENERAL_DISCOVERABLE: u8 = 0x02;
pub const BR_EDR_NOT_SUPPORTED: u8 = 0x04;

pub type AdBuffer = Vec<u8, MAX_AD_LEN>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioFault {
    #[error("Bluetooth init failed")]
    Enable,
    #[error("Bluetooth init timed out")]
    EnableTimeout,
    #[error("Advertising failed to stop")]
    Stop,
    #[error("Advertising failed to start")]
    Start,
    #[error("Advertising requested before the radio was enabled")]
    NotEnabled,
    #[error("Advertising data exceeds 31 bytes")]
    PayloadTooLarge,
    /// The host stack's event loop exited.
    #[error("Bluetooth host stopped")]
    HostStopped,
}

/// Parameters handed to the stack with every start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParams {
    pub interval_min_ms: u32,
    pub interval_max_ms: u32,
    pub connectable: bool,
    pub scannable: bool,
}

impl AdvertisingParams {
    /// Slow, non-connectable advertising with a scan response for the name.
    pub const fn beacon(interval_min_ms: u32, interval_max_ms: u32) -> Self {
        Self {
            interval_min_ms,
            interval_max_ms,
            connectable: false,
            scannable: true,
        }
    }
}

/// Bluetooth stack as seen by the beacon.
pub trait RadioStack {
    type Error: Debug;

    /// Bring the stack up. Resolves when the stack reports ready or failed.
    fn enable(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    fn advertising_stop(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    fn advertising_start(
        &mut self,
        params: &AdvertisingParams,
        ad: &[u8],
        scan_response: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingState {
    Uninitialized,
    Enabling,
    /// Stack is up, nothing on air.
    Ready,
    /// On air with this payload.
    Advertising([u8; RECORD_LEN]),
}

fn push_structure(buf: &mut AdBuffer, ad_type: u8, data: &[u8]) -> Result<(), RadioFault> {
    let len = u8::try_from(data.len() + 1).map_err(|_| RadioFault::PayloadTooLarge)?;
    buf.push(len).map_err(|_| RadioFault::PayloadTooLarge)?;
    buf.push(ad_type).map_err(|_| RadioFault::PayloadTooLarge)?;
    buf.extend_from_slice(data)
        .map_err(|_| RadioFault::PayloadTooLarge)
}

/// Flags followed by the record as manufacturer specific data.
pub fn advertising_data(payload: &[u8; RECORD_LEN]) -> Result<AdBuffer, RadioFault> {
    let mut buf = AdBuffer::new();
    push_structure(
        &mut buf,
        AD_TYPE_FLAGS,
        &[LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED],
    )?;
    push_structure(&mut buf, AD_TYPE_MANUFACTURER_DATA, payload)?;
    Ok(buf)
}

/// Scan response carrying the complete local name.
pub fn scan_response(device_name: &str) -> Result<AdBuffer, RadioFault> {
    let mut buf = AdBuffer::new();
    push_structure(&mut buf, AD_TYPE_COMPLETE_LOCAL_NAME, device_name.as_bytes())?;
    Ok(buf)
}

/// Owns the broadcast.
///
/// Every update is a full stop + settle + start; restarting immediately after
/// a stop is unreliable on the stacks this runs on.
pub struct AdvertisingController<R, D> {
    stack: R,
    delay: D,
    params: AdvertisingParams,
    settle_ms: u32,
    enable_timeout_ms: u32,
    scan_response: AdBuffer,
    state: AdvertisingState,
}

impl<R: RadioStack, D: DelayNs> AdvertisingController<R, D> {
    pub fn new(stack: R, delay: D, config: &RadioConfig) -> Self {
        Self {
            stack,
            delay,
            params: AdvertisingParams::beacon(
                config.adv_interval_min_ms,
                config.adv_interval_max_ms,
            ),
            settle_ms: config.settle_ms,
            enable_timeout_ms: config.enable_timeout_ms,
            scan_response: AdBuffer::new(),
            state: AdvertisingState::Uninitialized,
        }
    }

    pub fn state(&self) -> AdvertisingState {
        self.state
    }

    pub fn stack(&self) -> &R {
        &self.stack
    }

    /// One-time bring-up. Blocks until the stack reports ready, fails or the
    /// enable timeout elapses.
    pub async fn enable(&mut self, device_name: &str) -> Result<(), RadioFault> {
        if self.state != AdvertisingState::Uninitialized {
            warn!("Radio already enabled");
            return Ok(());
        }

        self.scan_response = scan_response(device_name)?;
        self.state = AdvertisingState::Enabling;

        match select(
            self.stack.enable(),
            self.delay.delay_ms(self.enable_timeout_ms),
        )
        .await
        {
            Either::First(Ok(())) => {
                info!("Bluetooth initialized");
                self.state = AdvertisingState::Ready;
                Ok(())
            }
            Either::First(Err(e)) => {
                warn!("Bluetooth init failed: {:?}", e);
                self.state = AdvertisingState::Uninitialized;
                Err(RadioFault::Enable)
            }
            Either::Second(()) => {
                warn!(
                    "Bluetooth not ready after {} ms",
                    self.enable_timeout_ms
                );
                self.state = AdvertisingState::Uninitialized;
                Err(RadioFault::EnableTimeout)
            }
        }
    }

    /// Replace the broadcast payload with the current record.
    pub async fn restart(&mut self, record: &StateRecord) -> Result<(), RadioFault> {
        let payload = record.serialize();

        match self.state {
            AdvertisingState::Uninitialized | AdvertisingState::Enabling => {
                return Err(RadioFault::NotEnabled);
            }
            AdvertisingState::Advertising(_) => {
                self.stack.advertising_stop().await.map_err(|e| {
                    warn!("Advertising failed to stop: {:?}", e);
                    RadioFault::Stop
                })?;
                self.state = AdvertisingState::Ready;
                self.delay.delay_ms(self.settle_ms).await;
            }
            AdvertisingState::Ready => {}
        }

        let ad = advertising_data(&payload)?;
        self.stack
            .advertising_start(&self.params, &ad, &self.scan_response)
            .await
            .map_err(|e| {
                warn!("Advertising failed to start: {:?}", e);
                RadioFault::Start
            })?;

        self.state = AdvertisingState::Advertising(payload);
        debug!("Advertising serial {}", record.serial());
        Ok(())
    }
}
