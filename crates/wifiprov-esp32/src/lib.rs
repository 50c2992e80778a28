//! ESP32-specific components for the provisioning bootstrap.
//!
//! This crate implements the platform traits from `wifiprov-core` on top of
//! ESP-IDF:
//! - [`spiffs::SpiffsFs`]: settings file on the SPIFFS partition
//! - [`nvs::NvsFlagStore`]: double-reset marker in NVS
//! - [`wifi::WifiProvisioner`]: station connect and the configuration portal
//! - [`led::LedIndicator`]: status LED on a GPIO
//! - [`system::EspSystem`]: FreeRTOS delays and chip restart
//!
//! # Example
//!
//! ```ignore
//! use wifiprov_esp32::wifi::WifiProvisioner;
//!
//! let mut provisioner = WifiProvisioner::new(peripherals.modem, sysloop, nvs.clone())?;
//! ```

pub mod led;
pub mod nvs;
pub mod spiffs;
pub mod system;
pub mod wifi;
