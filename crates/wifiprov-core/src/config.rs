//! Boot configuration.
//!
//! Compiled-in defaults match the shipped firmware. Platforms may override
//! individual fields (the host simulator reads a `boot.json`), and any field
//! left out keeps its default.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Path of the settings file on flash.
pub const DEFAULT_SETTINGS_PATH: &str = "/sample_config.json";

/// Configuration for the provisioning bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BootConfig {
    /// Settings file path on the flash filesystem.
    pub settings_path: String,

    /// SSID of the configuration access point.
    pub portal_ssid: String,

    /// WPA2 passphrase of the configuration access point.
    pub portal_password: String,

    /// Seconds after boot during which a second reset counts as a double reset.
    pub double_reset_window_secs: u64,

    /// Seconds the configuration portal waits for a submission.
    pub portal_timeout_secs: u64,

    /// Seconds to wait for a station connection.
    pub connect_timeout_secs: u64,

    /// Milliseconds to wait before restarting after a failed connect.
    pub restart_delay_ms: u64,

    /// Milliseconds between indicator toggles of the double-reset blink.
    pub blink_interval_ms: u64,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            settings_path: DEFAULT_SETTINGS_PATH.to_string(),
            portal_ssid: "WifiTetris".to_string(),
            portal_password: "clock123".to_string(),
            double_reset_window_secs: 5,
            portal_timeout_secs: 180,
            connect_timeout_secs: 30,
            restart_delay_ms: 3000,
            blink_interval_ms: 50,
        }
    }
}

impl BootConfig {
    pub fn double_reset_window(&self) -> Duration {
        Duration::from_secs(self.double_reset_window_secs)
    }

    pub fn portal_timeout(&self) -> Duration {
        Duration::from_secs(self.portal_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config: BootConfig =
            serde_json::from_str(r#"{"portalSsid":"Bench","portalTimeoutSecs":20}"#).unwrap();

        assert_eq!(config.portal_ssid, "Bench");
        assert_eq!(config.portal_timeout(), Duration::from_secs(20));
        assert_eq!(config.portal_password, "clock123");
        assert_eq!(config.settings_path, DEFAULT_SETTINGS_PATH);
        assert_eq!(config.restart_delay(), Duration::from_secs(3));
    }
}
