//! Double-reset detection.
//!
//! A marker word is kept in storage that survives a reset (RTC memory, NVS
//! or a file). Booting with the marker already set means the previous boot
//! was reset before its detection window ran out.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Marker written at boot; seeing it on the next boot means double reset.
pub const FLAG_SET: u32 = 0xD0D0_1234;

/// Marker written once the detection window has passed.
pub const FLAG_CLEAR: u32 = 0xD0D0_4321;

/// Storage for the reset marker.
pub trait ResetFlagStore {
    type Error: std::fmt::Display;

    /// Read the marker. `None` if it was never written.
    fn read_flag(&mut self) -> Result<Option<u32>, Self::Error>;

    fn write_flag(&mut self, flag: u32) -> Result<(), Self::Error>;
}

/// Anything that can tell whether the device was double-reset.
pub trait ResetDetector {
    /// Check for a double reset. Call once, early in boot.
    fn detect_double_reset(&mut self) -> bool;

    /// Service the detector from the main loop.
    fn poll(&mut self);

    /// Close the detection window now, so the next boot is not read as a
    /// double reset. Call before a software restart.
    fn stop(&mut self);
}

/// Double-reset detector over a [`ResetFlagStore`].
pub struct DoubleResetDetector<S: ResetFlagStore> {
    store: S,
    window: Duration,
    started: Instant,
    waiting: bool,
}

impl<S: ResetFlagStore> DoubleResetDetector<S> {
    /// Create a detector. The detection window starts now.
    pub fn new(store: S, window: Duration) -> Self {
        Self {
            store,
            window,
            started: Instant::now(),
            waiting: false,
        }
    }

    /// Whether the window is still open (a reset now would count).
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Clear the marker after `elapsed` since boot, if the window has passed.
    pub fn poll_elapsed(&mut self, elapsed: Duration) {
        if self.waiting && elapsed > self.window {
            debug!("Double-reset window elapsed");
            self.stop();
        }
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn write(&mut self, flag: u32) {
        if let Err(e) = self.store.write_flag(flag) {
            warn!("Failed to write reset flag: {}", e);
        }
    }
}

impl<S: ResetFlagStore> ResetDetector for DoubleResetDetector<S> {
    fn detect_double_reset(&mut self) -> bool {
        let flag = match self.store.read_flag() {
            Ok(flag) => flag,
            Err(e) => {
                warn!("Failed to read reset flag: {}", e);
                None
            }
        };

        if flag == Some(FLAG_SET) {
            info!("Double reset detected");
            // Consumed: a third reset starts a fresh window.
            self.stop();
            return true;
        }

        self.write(FLAG_SET);
        self.waiting = true;
        false
    }

    fn poll(&mut self) {
        let elapsed = self.started.elapsed();
        self.poll_elapsed(elapsed);
    }

    fn stop(&mut self) {
        self.write(FLAG_CLEAR);
        self.waiting = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RtcWord(Option<u32>);

    impl ResetFlagStore for &mut RtcWord {
        type Error = std::convert::Infallible;

        fn read_flag(&mut self) -> Result<Option<u32>, Self::Error> {
            Ok(self.0)
        }

        fn write_flag(&mut self, flag: u32) -> Result<(), Self::Error> {
            self.0 = Some(flag);
            Ok(())
        }
    }

    struct FailingStore;

    impl ResetFlagStore for FailingStore {
        type Error = &'static str;

        fn read_flag(&mut self) -> Result<Option<u32>, Self::Error> {
            Err("rtc unavailable")
        }

        fn write_flag(&mut self, _flag: u32) -> Result<(), Self::Error> {
            Err("rtc unavailable")
        }
    }

    const WINDOW: Duration = Duration::from_secs(5);

    #[test]
    fn test_first_boot_is_not_double_reset() {
        let mut rtc = RtcWord::default();
        let mut drd = DoubleResetDetector::new(&mut rtc, WINDOW);
        assert!(!drd.detect_double_reset());
        assert!(drd.is_waiting());
        drop(drd);
        assert_eq!(rtc.0, Some(FLAG_SET));
    }

    #[test]
    fn test_reset_inside_window_is_detected() {
        let mut rtc = RtcWord::default();
        {
            let mut drd = DoubleResetDetector::new(&mut rtc, WINDOW);
            drd.detect_double_reset();
            drd.poll_elapsed(Duration::from_secs(1));
        }
        let mut drd = DoubleResetDetector::new(&mut rtc, WINDOW);
        assert!(drd.detect_double_reset());
        assert!(!drd.is_waiting());
        drop(drd);
        assert_eq!(rtc.0, Some(FLAG_CLEAR));
    }

    #[test]
    fn test_stop_clears_marker() {
        let mut rtc = RtcWord::default();
        {
            let mut drd = DoubleResetDetector::new(&mut rtc, WINDOW);
            drd.detect_double_reset();
            drd.stop();
            assert!(!drd.is_waiting());
        }
        let mut drd = DoubleResetDetector::new(&mut rtc, WINDOW);
        assert!(!drd.detect_double_reset());
    }

    #[test]
    fn test_reset_after_window_is_not_detected() {
        let mut rtc = RtcWord::default();
        {
            let mut drd = DoubleResetDetector::new(&mut rtc, WINDOW);
            drd.detect_double_reset();
            drd.poll_elapsed(Duration::from_secs(6));
            assert!(!drd.is_waiting());
        }
        assert_eq!(rtc.0, Some(FLAG_CLEAR));

        let mut drd = DoubleResetDetector::new(&mut rtc, WINDOW);
        assert!(!drd.detect_double_reset());
    }

    #[test]
    fn test_garbage_flag_is_not_double_reset() {
        let mut rtc = RtcWord(Some(0xDEAD_BEEF));
        let mut drd = DoubleResetDetector::new(&mut rtc, WINDOW);
        assert!(!drd.detect_double_reset());
    }

    #[test]
    fn test_store_errors_mean_no_double_reset() {
        let mut drd = DoubleResetDetector::new(FailingStore, WINDOW);
        assert!(!drd.detect_double_reset());
        drd.poll_elapsed(Duration::from_secs(10));
        assert!(!drd.is_waiting());
    }
}
