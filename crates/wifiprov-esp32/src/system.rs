use std::time::Duration;

use esp_idf_svc::hal::delay::FreeRtos;
use log::warn;
use wifiprov_core::System;

/// FreeRTOS delays and a chip reset.
#[derive(Debug, Default)]
pub struct EspSystem;

impl System for EspSystem {
    fn delay(&mut self, duration: Duration) {
        FreeRtos::delay_ms(u32::try_from(duration.as_millis()).unwrap_or(u32::MAX));
    }

    fn restart(&mut self) {
        warn!("Restarting");
        // SAFETY: takes no arguments, has no preconditions and does not return.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }
}
