//! Configuration embedded by `build.rs`.

use beacon_core::BeaconConfig;
use log::error;

static CONFIG_BLOB: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/beacon_config.bin"));

/// Decode the build-time configuration, falling back to the defaults.
pub fn load() -> BeaconConfig {
    match BeaconConfig::from_postcard(CONFIG_BLOB) {
        Ok(config) => config,
        Err(e) => {
            error!("Embedded configuration rejected, using defaults: {}", e);
            BeaconConfig::default()
        }
    }
}
