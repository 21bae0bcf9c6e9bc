//! BLE GATT provisioning service.
//!
//! Lets a phone app (e.g. nRF Connect) configure the network while the device
//! is in configuration mode.
//!
//! # GATT Service Structure
//!
//! ```text
//! Service: Librarian Provisioning
//! ├── Status (Read, Notify) - config_mode / saved / failed:<reason>
//! ├── SSID (Read, Write) - network name
//! ├── Secret (Write) - network passphrase
//! └── Commit (Write) - "save" submits, "clear" discards
//! ```
//!
//! Credentials travel as plaintext inside the BLE link; configure the device
//! in a physically trusted place.

use super::pending::PendingCredential;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{uuid128, BLEAdvertisementData, BLEDevice, BLEError, NimbleProperties};
use log::{info, warn};
use std::fmt;
use std::sync::Arc;

const SERVICE_UUID: BleUuid = uuid128!("7e1b0a40-5c2e-4d8a-9f10-3b6c2a1e0f00");
const STATUS_CHAR_UUID: BleUuid = uuid128!("7e1b0a40-5c2e-4d8a-9f10-3b6c2a1e0f01");
const SSID_CHAR_UUID: BleUuid = uuid128!("7e1b0a40-5c2e-4d8a-9f10-3b6c2a1e0f02");
const SECRET_CHAR_UUID: BleUuid = uuid128!("7e1b0a40-5c2e-4d8a-9f10-3b6c2a1e0f03");
const COMMIT_CHAR_UUID: BleUuid = uuid128!("7e1b0a40-5c2e-4d8a-9f10-3b6c2a1e0f04");

/// Advertised name while waiting for configuration.
const DEVICE_NAME: &str = "Ebook-Library-Setup";

/// Submission entry point shared with the setup portal.
pub type SubmitFn = dyn Fn(&str, &str) -> Result<(), String> + Send + Sync;

/// Registered provisioning service.
pub struct ProvisioningService {
    pending: PendingCredential,
}

impl ProvisioningService {
    /// Register the service on the BLE server and start advertising.
    pub fn start(submit: Arc<SubmitFn>) -> Result<Self, BLEError> {
        let device = BLEDevice::take();
        let server = device.get_server();
        let pending = PendingCredential::new();

        let service = server.create_service(SERVICE_UUID);

        // Status (Read + Notify)
        let status_char = service.lock().create_characteristic(
            STATUS_CHAR_UUID,
            NimbleProperties::READ | NimbleProperties::NOTIFY,
        );
        let status_pending = pending.clone();
        status_char.lock().on_read(move |char, _conn| {
            char.set_value(status_pending.status().to_ble_string().as_bytes());
        });

        // SSID (Read + Write)
        let ssid_char = service.lock().create_characteristic(
            SSID_CHAR_UUID,
            NimbleProperties::READ | NimbleProperties::WRITE,
        );
        let ssid_read = pending.clone();
        ssid_char.lock().on_read(move |char, _conn| {
            char.set_value(ssid_read.ssid().as_bytes());
        });
        let ssid_write = pending.clone();
        ssid_char.lock().on_write(move |args| {
            if let Err(e) = ssid_write.set_ssid(args.recv_data()) {
                warn!("SSID write rejected: {}", e);
            }
        });

        // Secret (Write only)
        let secret_char = service
            .lock()
            .create_characteristic(SECRET_CHAR_UUID, NimbleProperties::WRITE);
        let secret_write = pending.clone();
        secret_char.lock().on_write(move |args| {
            if let Err(e) = secret_write.set_secret(args.recv_data()) {
                warn!("Secret write rejected: {}", e);
            }
        });

        // Commit (Write only)
        let commit_char = service
            .lock()
            .create_characteristic(COMMIT_CHAR_UUID, NimbleProperties::WRITE);
        let commit_pending = pending.clone();
        let notify_char = status_char.clone();
        commit_char.lock().on_write(move |args| {
            let status = commit_pending.commit(args.recv_data(), |ssid, secret| submit(ssid, secret));
            info!("BLE commit: {}", status);
            notify_char
                .lock()
                .set_value(status.to_ble_string().as_bytes())
                .notify();
        });

        let advertising = device.get_advertising();
        advertising.lock().set_data(
            BLEAdvertisementData::new()
                .name(DEVICE_NAME)
                .add_service_uuid(SERVICE_UUID),
        )?;
        advertising.lock().start()?;
        info!("BLE provisioning advertising as '{}'", DEVICE_NAME);

        Ok(Self { pending })
    }

    /// Current status as seen by BLE clients.
    pub fn status(&self) -> super::ProvisionStatus {
        self.pending.status()
    }
}

impl fmt::Debug for ProvisioningService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningService")
            .field("status", &self.pending.status())
            .finish()
    }
}
