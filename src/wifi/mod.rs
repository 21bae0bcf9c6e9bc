//! WiFi driver abstraction.
//!
//! The provisioning controller only needs two things from the radio: join a
//! network within a bounded wait, or bring up the configuration access point.
//!
//! # Drivers
//!
//! - [`EspWifiDriver`] - ESP-IDF WiFi driver (ESP32 only)
//! - [`HostWifi`] - the OS network stack, for host builds

#[cfg(feature = "esp32")]
mod connection;
mod host;

#[cfg(feature = "esp32")]
pub use connection::EspWifiDriver;
pub use host::HostWifi;

use crate::config::{AccessPointConfig, Credential};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Station and access point control.
pub trait WifiDriver: Send {
    /// Join the network described by `credential`, waiting at most `timeout`.
    ///
    /// Returns the assigned address once the interface is up.
    fn join(&mut self, credential: &Credential, timeout: Duration) -> Result<IpAddr, JoinError>;

    /// Start the configuration access point.
    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<IpAddr, JoinError>;
}

/// Errors from [`WifiDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// No address was obtained before the deadline.
    Timeout,
    /// The network refused the credential, or the values do not fit the driver.
    Rejected(String),
    /// The radio or driver failed.
    Driver(String),
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out waiting for the network"),
            Self::Rejected(e) => write!(f, "network rejected the credential: {}", e),
            Self::Driver(e) => write!(f, "wifi driver error: {}", e),
        }
    }
}

impl std::error::Error for JoinError {}

impl<W: WifiDriver + ?Sized> WifiDriver for Box<W> {
    fn join(&mut self, credential: &Credential, timeout: Duration) -> Result<IpAddr, JoinError> {
        (**self).join(credential, timeout)
    }

    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<IpAddr, JoinError> {
        (**self).start_access_point(config)
    }
}
