//! NVS-backed storage: the double-reset marker and station credentials.

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::EspError;
use log::warn;
use wifiprov_core::{ResetFlagStore, WifiCredentials};

/// NVS namespace for everything this crate stores.
pub const NAMESPACE: &str = "wifiprov";

const FLAG_KEY: &str = "drd_flag";
const CREDENTIALS_KEY: &str = "wifi_json";

/// Large enough for a 32-byte SSID and a 64-byte passphrase as JSON.
const CREDENTIALS_BUF_LEN: usize = 256;

/// Opens the shared namespace.
pub fn open(partition: EspDefaultNvsPartition) -> Result<EspNvs<NvsDefault>, EspError> {
    EspNvs::new(partition, NAMESPACE, true)
}

/// Reset marker in NVS. Survives resets and power loss.
pub struct NvsFlagStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsFlagStore {
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, EspError> {
        Ok(Self {
            nvs: open(partition)?,
        })
    }
}

impl ResetFlagStore for NvsFlagStore {
    type Error = EspError;

    fn read_flag(&mut self) -> Result<Option<u32>, Self::Error> {
        self.nvs.get_u32(FLAG_KEY)
    }

    fn write_flag(&mut self, flag: u32) -> Result<(), Self::Error> {
        self.nvs.set_u32(FLAG_KEY, flag)
    }
}

/// Read saved station credentials. Unreadable entries count as absent.
pub fn load_credentials(nvs: &EspNvs<NvsDefault>) -> Option<WifiCredentials> {
    let mut buffer = [0_u8; CREDENTIALS_BUF_LEN];
    match nvs.get_str(CREDENTIALS_KEY, &mut buffer) {
        Ok(Some(json)) => match serde_json::from_str(json) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                warn!("Ignoring malformed credentials: {}", e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to read credentials: {}", e);
            None
        }
    }
}

pub fn save_credentials(
    nvs: &mut EspNvs<NvsDefault>,
    credentials: &WifiCredentials,
) -> anyhow::Result<()> {
    let payload = serde_json::to_string(credentials)?;
    nvs.set_str(CREDENTIALS_KEY, &payload)?;
    Ok(())
}
