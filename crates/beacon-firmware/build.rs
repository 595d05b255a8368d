//! Bakes the beacon configuration into the firmware image.
//!
//! Defaults come from `beacon-core`; any `BEACON_*` variable set in the
//! environment or in `.env` overrides them. The validated result is written
//! to `$OUT_DIR/beacon_config.bin` as postcard and embedded with
//! `include_bytes!`, so a bad configuration fails the build instead of the
//! device.

use std::env;
use std::fs;
use std::path::PathBuf;

use beacon_core::BeaconConfig;

fn main() {
    println!("cargo:rerun-if-changed=.env");
    // A missing .env just means defaults.
    let _ = dotenvy::dotenv();

    let mut config = BeaconConfig::default();
    for key in BeaconConfig::OVERRIDE_KEYS {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = env::var(key) {
            if let Err(e) = config.apply_override(key, &value) {
                panic!("{key}={value:?}: {e}");
            }
        }
    }

    if let Err(e) = config.validate() {
        panic!("Beacon configuration rejected: {e}");
    }

    let mut buf = [0u8; 128];
    let blob = match config.to_postcard(&mut buf) {
        Ok(blob) => blob,
        Err(e) => panic!("{e}"),
    };

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::write(out_dir.join("beacon_config.bin"), blob).expect("Failed to write configuration blob");

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
