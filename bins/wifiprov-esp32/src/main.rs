//! Provisioning bootstrap firmware for ESP32.
//!
//! This binary requires the ESP32 Rust toolchain.
//! It will not compile with the standard Rust toolchain.

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{delay::FreeRtos, gpio::OutputPin, prelude::Peripherals},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
};
use log::info;
use wifiprov_core::{BootConfig, Bootstrap, DoubleResetDetector, ResetDetector, SettingsStore};
use wifiprov_esp32::{
    led::LedIndicator, nvs::NvsFlagStore, spiffs::SpiffsFs, system::EspSystem,
    wifi::WifiProvisioner,
};

const LOOP_INTERVAL_MS: u32 = 100;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    // Give a serial monitor time to attach.
    FreeRtos::delay_ms(1000);
    info!("Provisioning bootstrap starting...");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let config = BootConfig::default();
    let mut store = SettingsStore::new(SpiffsFs::new(), config.settings_path.clone());
    let mut detector = DoubleResetDetector::new(
        NvsFlagStore::new(nvs.clone())?,
        config.double_reset_window(),
    );
    let mut provisioner = WifiProvisioner::new(peripherals.modem, sysloop, nvs)?;
    let mut led = LedIndicator::new(peripherals.pins.gpio2.downgrade_output())?;
    let mut system = EspSystem;

    let outcome = Bootstrap::new(
        &config,
        &mut store,
        &mut detector,
        &mut provisioner,
        &mut led,
        &mut system,
    )
    .run()?;

    info!(
        "Setup complete in {:?} mode, IP address {}",
        outcome.mode, outcome.ip
    );
    info!("Settings: {}", serde_json::to_string(&outcome.settings)?);

    // `provisioner` owns the WiFi driver and must outlive the loop.
    loop {
        detector.poll();
        FreeRtos::delay_ms(LOOP_INTERVAL_MS);
    }
}
