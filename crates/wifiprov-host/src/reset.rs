//! Reset marker kept in a file, standing in for RTC memory.

use std::fs;
use std::io;
use std::path::PathBuf;

use wifiprov_core::ResetFlagStore;

/// Stores the marker word as hex text.
pub struct FileFlagStore {
    path: PathBuf,
}

impl FileFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResetFlagStore for FileFlagStore {
    type Error = io::Error;

    fn read_flag(&mut self) -> Result<Option<u32>, Self::Error> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        u32::from_str_radix(text.trim(), 16)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write_flag(&mut self, flag: u32) -> Result<(), Self::Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{:08x}\n", flag))
    }
}
