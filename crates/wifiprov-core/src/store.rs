//! Settings persistence over a flash filesystem.
//!
//! The filesystem itself is abstract so each platform can supply its own:
//! - Linux: a directory on the host (`wifiprov-host`)
//! - ESP32: SPIFFS (`wifiprov-esp32`)
//! - Tests: [`MemoryFs`]
//!
//! All methods are synchronous to support embedded platforms.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::settings::DeviceSettings;

/// Errors that can occur while talking to the flash filesystem.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The filesystem could not be mounted, even after formatting.
    #[error("Failed to mount filesystem: {0}")]
    MountFailed(String),

    /// Failed to read a file.
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    /// Failed to write a file.
    #[error("Failed to write {path}: {message}")]
    WriteError { path: String, message: String },

    /// Settings could not be encoded.
    #[error("Failed to serialize settings: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// A flat flash filesystem addressed by absolute path (e.g. `/sample_config.json`).
pub trait FlashFs {
    /// Mount the filesystem.
    ///
    /// With `format_on_fail` set, a failed mount formats the partition and
    /// mounts again. Formatting erases every file.
    fn mount(&mut self, format_on_fail: bool) -> Result<(), StoreError>;

    /// Check if a file exists.
    fn exists(&self, path: &str) -> bool;

    /// Read a whole file.
    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or truncate a file and write `data` to it.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StoreError>;
}

/// Result of loading settings from flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file existed and parsed; every field was applied.
    Loaded(DeviceSettings),
    /// No settings file on flash.
    NotFound,
    /// The file existed but could not be read or parsed. No field was applied.
    Corrupt(String),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }

    /// The loaded settings, or `defaults` when nothing usable was found.
    pub fn settings_or(self, defaults: DeviceSettings) -> DeviceSettings {
        match self {
            LoadOutcome::Loaded(settings) => settings,
            LoadOutcome::NotFound | LoadOutcome::Corrupt(_) => defaults,
        }
    }
}

/// JSON settings file on a [`FlashFs`].
pub struct SettingsStore<F: FlashFs> {
    fs: F,
    path: String,
    mounted: bool,
}

impl<F: FlashFs> SettingsStore<F> {
    pub fn new(fs: F, path: impl Into<String>) -> Self {
        Self {
            fs,
            path: path.into(),
            mounted: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Access the underlying filesystem.
    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Mount the filesystem, formatting it if a plain mount fails.
    ///
    /// Data loss on a failed first mount is accepted: an unmountable
    /// partition holds nothing we could read anyway.
    pub fn mount(&mut self) -> Result<(), StoreError> {
        if self.mounted {
            return Ok(());
        }

        debug!("Mounting filesystem...");
        if let Err(e) = self.fs.mount(false) {
            warn!("Mount failed ({}), formatting and retrying", e);
            self.fs.mount(true)?;
        }

        info!("Mounted filesystem");
        self.mounted = true;
        Ok(())
    }

    /// Load settings from flash.
    ///
    /// Returns `Err` only when the filesystem cannot be mounted at all.
    pub fn load(&mut self) -> Result<LoadOutcome, StoreError> {
        self.mount()?;

        if !self.fs.exists(&self.path) {
            info!("No settings file at {}", self.path);
            return Ok(LoadOutcome::NotFound);
        }

        debug!("Reading settings file {}", self.path);
        let bytes = match self.fs.read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read settings: {}", e);
                return Ok(LoadOutcome::Corrupt(e.to_string()));
            }
        };

        match serde_json::from_slice::<DeviceSettings>(&bytes) {
            Ok(mut settings) => {
                let label = std::mem::take(&mut settings.label);
                settings.set_label(&label);
                if let Ok(pretty) = serde_json::to_string_pretty(&settings) {
                    debug!("Parsed settings:\n{}", pretty);
                }
                info!("Loaded settings from {}", self.path);
                Ok(LoadOutcome::Loaded(settings))
            }
            Err(e) => {
                warn!("Failed to parse settings file {}: {}", self.path, e);
                Ok(LoadOutcome::Corrupt(e.to_string()))
            }
        }
    }

    /// Write settings to flash, replacing any previous file.
    pub fn save(&mut self, settings: &DeviceSettings) -> Result<(), StoreError> {
        self.mount()?;

        let json = serde_json::to_vec_pretty(settings)?;
        debug!("Saving settings:\n{}", String::from_utf8_lossy(&json));
        self.fs.write(&self.path, &json)?;

        info!("Saved settings to {}", self.path);
        Ok(())
    }
}

/// In-memory flash filesystem, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: HashMap<String, Vec<u8>>,
    /// Whether a plain mount succeeds.
    formatted: bool,
    /// Whether formatting can fix a failed mount.
    formattable: bool,
    formats: u32,
}

impl MemoryFs {
    /// A formatted, empty filesystem.
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            formatted: true,
            formattable: true,
            formats: 0,
        }
    }

    /// A partition that has never been formatted. Mounting needs a format.
    pub fn unformatted() -> Self {
        Self {
            formatted: false,
            ..Self::new()
        }
    }

    /// A partition that cannot be mounted at all.
    pub fn broken() -> Self {
        Self {
            formatted: false,
            formattable: false,
            ..Self::new()
        }
    }

    pub fn with_file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_string(), data.into());
        self
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Number of times the partition was formatted.
    pub fn format_count(&self) -> u32 {
        self.formats
    }
}

impl FlashFs for MemoryFs {
    fn mount(&mut self, format_on_fail: bool) -> Result<(), StoreError> {
        if self.formatted {
            return Ok(());
        }
        if !format_on_fail {
            return Err(StoreError::MountFailed("partition not formatted".to_string()));
        }
        if !self.formattable {
            return Err(StoreError::MountFailed("format failed".to_string()));
        }
        self.files.clear();
        self.formats += 1;
        self.formatted = true;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::ReadError {
                path: path.to_string(),
                message: "no such file".to_string(),
            })
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PATH: &str = "/sample_config.json";

    #[test]
    fn test_missing_file_is_not_found() {
        let mut store = SettingsStore::new(MemoryFs::new(), PATH);
        assert_eq!(store.load().unwrap(), LoadOutcome::NotFound);
    }

    #[test]
    fn test_load_save_round_trip() {
        let file = r#"{"testString":"kitchen","testNumber":-42,"testBool":false,"day":6}"#;
        let mut store = SettingsStore::new(MemoryFs::new().with_file(PATH, file), PATH);

        let loaded = match store.load().unwrap() {
            LoadOutcome::Loaded(settings) => settings,
            other => panic!("Expected Loaded, got {:?}", other),
        };
        assert_eq!(loaded.label, "kitchen");
        assert_eq!(loaded.count, -42);
        assert!(!loaded.flag);
        assert_eq!(loaded.selected_day, 6);

        store.save(&loaded).unwrap();
        assert_eq!(store.load().unwrap(), LoadOutcome::Loaded(loaded));
    }

    #[test]
    fn test_saved_file_is_pretty_json() {
        let mut store = SettingsStore::new(MemoryFs::new(), PATH);
        store.save(&DeviceSettings::default()).unwrap();

        let text = String::from_utf8(store.fs().file(PATH).unwrap().to_vec()).unwrap();
        assert!(text.contains("\n  \"testString\": \"default value\""));
        assert!(text.contains("\"day\": 3"));
    }

    #[test]
    fn test_corrupt_file_applies_nothing() {
        let mut store = SettingsStore::new(
            MemoryFs::new().with_file(PATH, r#"{"testString":"half","testNumber":"#),
            PATH,
        );
        let outcome = store.load().unwrap();
        assert!(matches!(outcome, LoadOutcome::Corrupt(_)));
        assert_eq!(
            outcome.settings_or(DeviceSettings::default()),
            DeviceSettings::default()
        );
    }

    #[test]
    fn test_missing_key_is_corrupt() {
        let mut store = SettingsStore::new(
            MemoryFs::new().with_file(PATH, r#"{"testString":"a","testNumber":1,"testBool":true}"#),
            PATH,
        );
        assert!(matches!(store.load().unwrap(), LoadOutcome::Corrupt(_)));
    }

    #[test]
    fn test_out_of_range_day_still_loads() {
        let file = r#"{"testString":"x","testNumber":1,"testBool":true,"day":9}"#;
        let mut store = SettingsStore::new(MemoryFs::new().with_file(PATH, file), PATH);
        match store.load().unwrap() {
            LoadOutcome::Loaded(settings) => assert_eq!(settings.selected_day, 9),
            other => panic!("Expected Loaded, got {:?}", other),
        }
    }

    #[test]
    fn test_long_label_truncated_on_load() {
        let file = format!(
            r#"{{"testString":"{}","testNumber":1,"testBool":true,"day":0}}"#,
            "a".repeat(70)
        );
        let mut store = SettingsStore::new(MemoryFs::new().with_file(PATH, file), PATH);
        match store.load().unwrap() {
            LoadOutcome::Loaded(settings) => assert_eq!(settings.label.len(), 49),
            other => panic!("Expected Loaded, got {:?}", other),
        }
    }

    #[test]
    fn test_unformatted_partition_is_formatted_once() {
        let mut store = SettingsStore::new(MemoryFs::unformatted(), PATH);
        assert_eq!(store.load().unwrap(), LoadOutcome::NotFound);
        store.save(&DeviceSettings::default()).unwrap();
        assert_eq!(store.fs().format_count(), 1);
    }

    #[test]
    fn test_broken_partition_reports_error() {
        let mut store = SettingsStore::new(MemoryFs::broken(), PATH);
        assert!(matches!(store.load(), Err(StoreError::MountFailed(_))));
        assert!(store.save(&DeviceSettings::default()).is_err());
    }
}
