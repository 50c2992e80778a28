//! Flash filesystem backed by a host directory.
//!
//! A missing directory plays the part of an unformatted partition: a plain
//! mount fails and formatting creates it. Anything other than a directory
//! at the root is wiped by a format.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use wifiprov_core::{FlashFs, StoreError};

pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a flash path like `/sample_config.json` into the root directory.
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn format(&self) -> std::io::Result<()> {
        if self.root.is_dir() {
            fs::remove_dir_all(&self.root)?;
        } else if self.root.exists() {
            fs::remove_file(&self.root)?;
        }
        fs::create_dir_all(&self.root)
    }
}

impl FlashFs for DirFs {
    fn mount(&mut self, format_on_fail: bool) -> Result<(), StoreError> {
        if self.root.is_dir() {
            debug!("Mounted {}", self.root.display());
            return Ok(());
        }

        if !format_on_fail {
            return Err(StoreError::MountFailed(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        warn!("Formatting {}", self.root.display());
        self.format()
            .map_err(|e| StoreError::MountFailed(format!("{}: {}", self.root.display(), e)))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        fs::read(self.resolve(path)).map_err(|e| StoreError::ReadError {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        fs::write(self.resolve(path), data).map_err(|e| StoreError::WriteError {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wifiprov_core::{DeviceSettings, LoadOutcome, SettingsStore};

    #[test]
    fn test_missing_dir_needs_format() {
        let dir = TempDir::new().unwrap();
        let mut fs = DirFs::new(dir.path().join("flash"));

        assert!(fs.mount(false).is_err());
        fs.mount(true).unwrap();
        assert!(fs.root().is_dir());
        fs.mount(false).unwrap();
    }

    #[test]
    fn test_file_in_place_of_partition_is_wiped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("flash");
        std::fs::write(&root, b"garbage").unwrap();

        let mut fs = DirFs::new(&root);
        assert!(fs.mount(false).is_err());
        fs.mount(true).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_settings_store_on_disk() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("flash");

        let mut store = SettingsStore::new(DirFs::new(&root), "/sample_config.json");
        assert_eq!(store.load().unwrap(), LoadOutcome::NotFound);

        let settings = DeviceSettings {
            label: "shed".to_string(),
            ..Default::default()
        };
        store.save(&settings).unwrap();
        assert!(root.join("sample_config.json").is_file());

        let mut reopened = SettingsStore::new(DirFs::new(&root), "/sample_config.json");
        assert_eq!(reopened.load().unwrap(), LoadOutcome::Loaded(settings));
    }
}
