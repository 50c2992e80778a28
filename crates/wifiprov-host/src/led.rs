//! Status LED written to the log.

use tracing::debug;
use wifiprov_core::Indicator;

#[derive(Debug, Default)]
pub struct LogIndicator {
    on: bool,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl Indicator for LogIndicator {
    fn set(&mut self, on: bool) {
        self.on = on;
        debug!(led = if on { "on" } else { "off" }, "Indicator");
    }

    fn toggle(&mut self) {
        let on = !self.on;
        self.set(on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        let mut led = LogIndicator::new();
        led.toggle();
        assert!(led.is_on());
        led.toggle();
        assert!(!led.is_on());
        led.set(true);
        assert!(led.is_on());
    }
}
