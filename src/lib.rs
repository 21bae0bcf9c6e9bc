//! E-book librarian firmware library.
//!
//! Everything except the thin hardware adapters (behind the `esp32` feature)
//! runs and is tested on the host.
//!
//! # Layout
//!
//! - [`config`] - credential types, settings, BLE provisioning
//! - [`storage`] - credential persistence (NVS or a host file)
//! - [`wifi`] - station join and configuration access point
//! - [`provisioning`] - boot-time connectivity decision
//! - [`indicator`] - status LED state and rendering
//! - [`input`] - push button
//! - [`volumes`] - SD card and reader mounts
//! - [`transfer`] - single-slot file copy engine
//! - [`metadata`], [`library`] - book listing
//! - [`web`], [`portal`] - HTTP surfaces for library and setup modes

pub mod config;
pub mod indicator;
pub mod input;
pub mod library;
pub mod metadata;
pub mod portal;
pub mod provisioning;
pub mod storage;
pub mod transfer;
pub mod volumes;
pub mod web;
pub mod wifi;

// Re-export commonly used items
pub use config::{ConfigError, Credential, Settings};
pub use indicator::{Indicator, IndicatorState};
pub use provisioning::{BootOutcome, ConnectivityState, ProvisioningController};
pub use transfer::{TransferEngine, TransferError, TransferStatus};
pub use volumes::{Volume, Volumes};
