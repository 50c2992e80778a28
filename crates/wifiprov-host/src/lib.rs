//! # wifiprov-host
//!
//! Host implementations of the platform traits from `wifiprov-core`, so the
//! provisioning bootstrap can run as an ordinary Linux process:
//!
//! - [`fs::DirFs`]: flash filesystem backed by a directory
//! - [`reset::FileFlagStore`]: reset marker kept in a file
//! - [`console::ConsoleProvisioner`]: the configuration portal as prompts on stdin
//! - [`led::LogIndicator`] and [`display::LogDisplay`]: outputs written to the log
//! - [`system::HostSystem`]: sleeping and restarting the process
//!
//! Everything lives under one data directory (see [`DataDir`]).

pub mod console;
pub mod display;
pub mod fs;
pub mod led;
pub mod reset;
pub mod system;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;
use wifiprov_core::BootConfig;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "WIFIPROV_DATA_DIR";

/// Data directory used when [`DATA_DIR_ENV`] is unset.
pub const DEFAULT_DATA_DIR: &str = ".wifiprov";

/// Layout of the simulator's data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve from [`DATA_DIR_ENV`], falling back to [`DEFAULT_DATA_DIR`].
    pub fn from_env() -> Self {
        let root = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory standing in for the flash partition.
    pub fn flash(&self) -> PathBuf {
        self.root.join("flash")
    }

    /// File standing in for RTC memory.
    pub fn reset_flag(&self) -> PathBuf {
        self.root.join("rtc_flag")
    }

    /// Saved station credentials.
    pub fn credentials(&self) -> PathBuf {
        self.root.join("wifi.json")
    }

    /// Optional boot configuration overrides.
    pub fn boot_config(&self) -> PathBuf {
        self.root.join("boot.json")
    }

    /// Load [`BootConfig`], applying `boot.json` over the defaults if present.
    pub fn load_boot_config(&self) -> anyhow::Result<BootConfig> {
        let path = self.boot_config();
        if !path.exists() {
            return Ok(BootConfig::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!("Loaded boot config overrides from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_boot_config_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let data = DataDir::new(dir.path());
        assert_eq!(data.load_boot_config().unwrap(), BootConfig::default());
    }

    #[test]
    fn test_boot_config_overrides() {
        let dir = TempDir::new().unwrap();
        let data = DataDir::new(dir.path());
        std::fs::write(data.boot_config(), r#"{"connectTimeoutSecs": 2}"#).unwrap();

        let config = data.load_boot_config().unwrap();
        assert_eq!(config.connect_timeout_secs, 2);
        assert_eq!(config.portal_ssid, "WifiTetris");
    }

    #[test]
    fn test_invalid_boot_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let data = DataDir::new(dir.path());
        std::fs::write(data.boot_config(), "connectTimeoutSecs = 2").unwrap();

        let err = data.load_boot_config().unwrap_err();
        assert!(err.to_string().contains("boot.json"));
    }
}
