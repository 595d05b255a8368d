//! BLE advertising through the `trouble-host` stack on the ESP32-S3 controller.
//!
//! The host stack's runner must be polled alongside the beacon loop; every
//! command issued here is serviced by it.

use beacon_core::{AdvertisingParams, RadioStack};
use bt_hci::cmd::info::ReadBdAddr;
use bt_hci::controller::ExternalController;
use embassy_time::Duration;
use esp_radio::ble::controller::BleConnector;
use log::{debug, info};
use trouble_host::prelude::*;

pub const CONNECTIONS_MAX: usize = 1;
pub const L2CAP_CHANNELS_MAX: usize = 1;

/// HCI command slots buffered between host and controller.
const HCI_SLOTS: usize = 20;

pub type BleController = ExternalController<BleConnector<'static>, HCI_SLOTS>;
pub type BleResources = HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX>;
pub type BleStack = Stack<'static, BleController, DefaultPacketPool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleError {
    /// The controller did not answer a host command.
    Controller,
    Advertise,
}

pub struct TroubleRadio {
    stack: &'static BleStack,
    peripheral: Peripheral<'static, BleController, DefaultPacketPool>,
    /// Advertising runs for as long as this is held.
    advertiser: Option<Advertiser<'static, BleController, DefaultPacketPool>>,
}

impl TroubleRadio {
    pub fn new(
        stack: &'static BleStack,
        peripheral: Peripheral<'static, BleController, DefaultPacketPool>,
    ) -> Self {
        Self {
            stack,
            peripheral,
            advertiser: None,
        }
    }
}

impl RadioStack for TroubleRadio {
    type Error = BleError;

    /// Resolves once the controller has finished bring-up and answers
    /// host commands.
    async fn enable(&mut self) -> Result<(), BleError> {
        let address = self.stack.command(ReadBdAddr::new()).await.map_err(|e| {
            debug!("BLE controller error: {:?}", e);
            BleError::Controller
        })?;
        info!("BLE controller ready, address {:?}", address);
        Ok(())
    }

    async fn advertising_stop(&mut self) -> Result<(), BleError> {
        // Dropping the advertiser disables advertising in the controller.
        self.advertiser = None;
        Ok(())
    }

    async fn advertising_start(
        &mut self,
        params: &AdvertisingParams,
        ad: &[u8],
        scan_response: &[u8],
    ) -> Result<(), BleError> {
        let advertisement = match (params.connectable, params.scannable) {
            (true, _) => Advertisement::ConnectableScannableUndirected {
                adv_data: ad,
                scan_data: scan_response,
            },
            (false, true) => Advertisement::NonconnectableScannableUndirected {
                adv_data: ad,
                scan_data: scan_response,
            },
            (false, false) => Advertisement::NonconnectableNonscannableUndirected { adv_data: ad },
        };

        let parameters = AdvertisementParameters {
            interval_min: Duration::from_millis(params.interval_min_ms.into()),
            interval_max: Duration::from_millis(params.interval_max_ms.into()),
            ..Default::default()
        };

        let advertiser = self
            .peripheral
            .advertise(&parameters, advertisement)
            .await
            .map_err(|e| {
                debug!("BLE advertise error: {:?}", e);
                BleError::Advertise
            })?;

        self.advertiser = Some(advertiser);
        Ok(())
    }
}
