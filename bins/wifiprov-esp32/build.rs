//! Build script for the ESP32 firmware.
//!
//! Sets up the ESP-IDF environment variables needed for compilation.

fn main() {
    // Required for esp-idf-svc to find the IDF toolchain
    embuild::espidf::sysenv::output();
}
