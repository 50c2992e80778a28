//! Status LED on a GPIO pin.

use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::sys::EspError;
use log::warn;
use wifiprov_core::Indicator;

pub struct LedIndicator {
    pin: PinDriver<'static, AnyOutputPin, Output>,
    lit: bool,
}

impl LedIndicator {
    pub fn new(pin: AnyOutputPin) -> Result<Self, EspError> {
        let mut pin = PinDriver::output(pin)?;
        pin.set_low()?;
        Ok(Self { pin, lit: false })
    }
}

impl Indicator for LedIndicator {
    fn set(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => self.lit = on,
            Err(e) => warn!("Failed to drive LED: {}", e),
        }
    }

    fn toggle(&mut self) {
        let on = !self.lit;
        self.set(on);
    }
}
