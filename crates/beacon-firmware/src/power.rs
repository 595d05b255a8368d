use beacon_core::PowerControl;

/// Cold reset through the system reset controller.
pub struct EspPower;

impl PowerControl for EspPower {
    fn cold_reset(&mut self) -> ! {
        esp_hal::system::software_reset()
    }
}
