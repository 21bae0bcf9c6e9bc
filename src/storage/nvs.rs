//! NVS persistence for the network credential.
//!
//! The credential lives in its own namespace so it never collides with other
//! stored settings.

use super::{CredentialStore, StoreError};
use crate::config::{Credential, MAX_SECRET_LEN, MAX_SSID_LEN};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;
use log::info;
use zeroize::Zeroize;

/// NVS namespace for the credential.
const NVS_NAMESPACE: &str = "librarian_wifi";

/// NVS key for the stored record.
const NVS_KEY: &str = "credentials";

/// Format: [ssid_len:1][ssid:32][secret_len:1][secret:64] plus margin.
const MAX_RECORD_SIZE: usize = 1 + MAX_SSID_LEN + 1 + MAX_SECRET_LEN + 4;

/// Credential store in ESP32 NVS.
pub struct NvsCredentialStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsCredentialStore {
    /// Open the namespace on the default NVS partition.
    pub fn open(partition: EspNvsPartition<NvsDefault>) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

impl CredentialStore for NvsCredentialStore {
    fn load(&self) -> Result<Credential, StoreError> {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let result = match self.nvs.get_raw(NVS_KEY, &mut buf) {
            Ok(Some(bytes)) => Credential::from_bytes(bytes).map_err(StoreError::Corrupt),
            Ok(None) => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::ReadError(format!("{:?}", e))),
        };
        buf.zeroize();
        result
    }

    fn save(&mut self, credential: &Credential) -> Result<(), StoreError> {
        let mut bytes = credential.to_bytes();
        let result = self.write_verified(&bytes);
        bytes.zeroize();
        result?;

        info!("Credential for '{}' saved to NVS", credential.ssid);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.nvs
            .remove(NVS_KEY)
            .map(|_| ())
            .map_err(|e| StoreError::WriteError(format!("{:?}", e)))
    }
}

impl NvsCredentialStore {
    /// Write, then read back to catch flash writes that fail silently.
    fn write_verified(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.nvs
            .set_raw(NVS_KEY, bytes)
            .map_err(|e| StoreError::WriteError(format!("{:?}", e)))?;

        let mut verify = [0u8; MAX_RECORD_SIZE];
        let outcome = match self.nvs.get_raw(NVS_KEY, &mut verify) {
            Ok(Some(read)) if read == bytes => Ok(()),
            Ok(Some(_)) => Err(StoreError::WriteError(
                "verification failed: data mismatch after save".into(),
            )),
            Ok(None) => Err(StoreError::WriteError(
                "record missing after save".into(),
            )),
            Err(e) => Err(StoreError::WriteError(format!("{:?}", e))),
        };
        verify.zeroize();
        outcome
    }
}
