//! # wifiprov-core
//!
//! Provisioning bootstrap for small WiFi devices.
//!
//! This crate provides:
//! - The persisted settings model (`DeviceSettings`, `Weekday`)
//! - A JSON settings store over an abstract flash filesystem
//! - The configuration portal form model and raw field conversion
//! - A double-reset detector over an abstract flag store
//! - A 16x2 status screen layout
//! - The bootstrap sequence that ties these together
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (host simulator) and ESP32 (esp-idf) targets.
//! Everything platform-specific sits behind the traits in [`bootstrap`],
//! [`store`], [`reset`] and [`display`].

pub mod bootstrap;
pub mod config;
pub mod display;
pub mod portal;
pub mod reset;
pub mod settings;
pub mod store;

pub use bootstrap::{
    decide_mode, maybe_save_settings, BootError, BootOutcome, BootPhase, Bootstrap, ConnectResult,
    Indicator, Mode, PortalInfo, PortalOutcome, PortalRequest, ProvisionError, Provisioner, System,
};
pub use config::BootConfig;
pub use display::{CharDisplay, StatusScreen};
pub use portal::{PortalForm, PortalParam, RawFields, WifiCredentials};
pub use reset::{DoubleResetDetector, ResetDetector, ResetFlagStore};
pub use settings::{DeviceSettings, Weekday};
pub use store::{FlashFs, LoadOutcome, MemoryFs, SettingsStore, StoreError};
