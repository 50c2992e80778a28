//! SPIFFS flash filesystem.
//!
//! The partition is registered with the VFS under a base path, after which
//! plain `std::fs` calls reach it.

use std::ffi::CString;
use std::fs;
use std::path::PathBuf;

use esp_idf_svc::sys::{esp, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register, ESP_ERR_INVALID_STATE};
use log::{info, warn};
use wifiprov_core::{FlashFs, StoreError};

/// VFS mount point.
pub const DEFAULT_BASE_PATH: &str = "/spiffs";

const MAX_OPEN_FILES: usize = 5;

pub struct SpiffsFs {
    base_path: String,
    partition_label: Option<String>,
}

impl SpiffsFs {
    /// Use the first SPIFFS partition, mounted at [`DEFAULT_BASE_PATH`].
    pub fn new() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            partition_label: None,
        }
    }

    pub fn with_partition(mut self, label: &str) -> Self {
        self.partition_label = Some(label.to_string());
        self
    }

    fn host_path(&self, path: &str) -> PathBuf {
        PathBuf::from(format!(
            "{}/{}",
            self.base_path,
            path.trim_start_matches('/')
        ))
    }
}

impl Default for SpiffsFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashFs for SpiffsFs {
    fn mount(&mut self, format_on_fail: bool) -> Result<(), StoreError> {
        let base_path = CString::new(self.base_path.as_str())
            .map_err(|e| StoreError::MountFailed(e.to_string()))?;
        let label = self
            .partition_label
            .as_deref()
            .map(CString::new)
            .transpose()
            .map_err(|e| StoreError::MountFailed(e.to_string()))?;

        let conf = esp_vfs_spiffs_conf_t {
            base_path: base_path.as_ptr(),
            partition_label: label.as_ref().map_or(std::ptr::null(), |l| l.as_ptr()),
            max_files: MAX_OPEN_FILES,
            format_if_mount_failed: format_on_fail,
        };

        // SAFETY: `conf` and the strings it points to outlive the call, and
        // the VFS layer copies `base_path` and the label during registration.
        match esp!(unsafe { esp_vfs_spiffs_register(&conf) }) {
            Ok(()) => {
                info!("SPIFFS mounted at {}", self.base_path);
                Ok(())
            }
            // Already registered by an earlier mount.
            Err(e) if e.code() == ESP_ERR_INVALID_STATE as i32 => Ok(()),
            Err(e) => {
                warn!("SPIFFS mount failed: {}", e);
                Err(StoreError::MountFailed(e.to_string()))
            }
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.host_path(path).exists()
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        fs::read(self.host_path(path)).map_err(|e| StoreError::ReadError {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        fs::write(self.host_path(path), data).map_err(|e| StoreError::WriteError {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}
