#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use beacon_core::{
    BeaconHardware, RadioFault, RebootPolicy, RebootReason, SensorFault, Sht40Device, boot,
};
use beacon_firmware::hardware::create_i2c_bus;
use beacon_firmware::power::EspPower;
use beacon_firmware::radio::{BleController, BleResources, BleStack, TroubleRadio};
use beacon_firmware::watchdog::{RtcWatchdog, on_starvation};
use bt_hci::controller::ExternalController;
use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_time::Delay;
use esp_hal::clock::CpuClock;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::ble::controller::BleConnector;
use log::{info, warn};
use static_cell::StaticCell;
use trouble_host::prelude::*;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    esp_hal::system::software_reset()
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static BLE_RESOURCES: StaticCell<BleResources> = StaticCell::new();
static BLE_STACK: StaticCell<BleStack> = StaticCell::new();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(log::LevelFilter::Info);

    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let config = beacon_firmware::config::load();
    let mut policy = RebootPolicy::new(EspPower, Delay, config.reboot_settle_ms);

    let i2c = match create_i2c_bus(peripherals.I2C0, peripherals.GPIO12, peripherals.GPIO11) {
        Ok(i2c) => i2c,
        Err(e) => {
            warn!("I2C bus configuration error: {:?}", e);
            policy.reboot(SensorFault::NotFound.into())
        }
    };

    let radio = match esp_radio::init() {
        Ok(radio) => RADIO.init(radio),
        Err(e) => {
            warn!("Radio controller init error: {:?}", e);
            policy.reboot(RadioFault::Enable.into())
        }
    };
    let connector = match BleConnector::new(radio, peripherals.BT, Default::default()) {
        Ok(connector) => connector,
        Err(e) => {
            warn!("BLE connector init error: {:?}", e);
            policy.reboot(RadioFault::Enable.into())
        }
    };
    let controller: BleController = ExternalController::new(connector);

    let stack: &'static BleStack = BLE_STACK.init(trouble_host::new(
        controller,
        BLE_RESOURCES.init(HostResources::new()),
    ));
    let Host {
        peripheral,
        mut runner,
        ..
    } = stack.build();

    info!("Peripherals initialized");

    let hardware = BeaconHardware {
        sensor: Sht40Device::new(i2c, Delay),
        radio: TroubleRadio::new(stack, peripheral),
        watchdog: RtcWatchdog::new(Rtc::new(peripherals.LPWR)),
        on_starvation,
    };

    // The host runner services every radio command the loop issues.
    let reason = match select(runner.run(), boot(config, hardware, Delay)).await {
        Either::First(result) => {
            warn!("BLE host runner exited: {:?}", result);
            RebootReason::Radio(RadioFault::HostStopped)
        }
        Either::Second(reason) => reason,
    };

    policy.reboot(reason)
}
