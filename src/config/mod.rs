//! Appliance configuration.
//!
//! # Components
//!
//! - [`wifi`] - credential types and validation (host-testable)
//! - [`settings`] - runtime settings with environment overrides
//! - [`pending`] - BLE pending-field handling (host-testable)
//! - [`ble_service`] - BLE GATT provisioning service (ESP32 only)

mod pending;
mod settings;
mod wifi;

#[cfg(feature = "esp32")]
mod ble_service;

pub use pending::PendingCredential;
pub use settings::{
    AccessPointConfig, ProvisioningConfig, Settings, DEFAULT_HTTP_PORT, DEFAULT_HTTP_WORKERS,
};
pub use wifi::{
    CommitCommand, ConfigError, Credential, ProvisionStatus, MAX_SECRET_LEN, MAX_SSID_LEN,
    MIN_SECRET_LEN,
};

#[cfg(feature = "esp32")]
pub use ble_service::{ProvisioningService, SubmitFn};
