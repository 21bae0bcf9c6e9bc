//! Host WiFi stand-in.
//!
//! On host systems the OS owns the network. Joining reports the local address
//! the OS would use, and the "access point" is simply every interface.

use super::{JoinError, WifiDriver};
use crate::config::{AccessPointConfig, Credential};
use log::info;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

/// Host network driver.
#[derive(Debug, Default)]
pub struct HostWifi {
    /// When set, every join attempt fails with [`JoinError::Rejected`].
    pub reject_joins: bool,
}

impl HostWifi {
    /// Create a new host driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary local IP address.
    ///
    /// Creates a UDP socket and "connects" it to a public address (nothing is
    /// sent), then reads back which local address the OS picked.
    fn detect_local_ip() -> Option<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        Some(socket.local_addr().ok()?.ip())
    }
}

impl WifiDriver for HostWifi {
    fn join(&mut self, credential: &Credential, _timeout: Duration) -> Result<IpAddr, JoinError> {
        if self.reject_joins {
            return Err(JoinError::Rejected(format!(
                "'{}' is not reachable from this host",
                credential.ssid
            )));
        }

        let ip = Self::detect_local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        info!("Host network ready for '{}', local IP: {}", credential.ssid, ip);
        Ok(ip)
    }

    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<IpAddr, JoinError> {
        info!(
            "Host stand-in for access point '{}' (channel {}), serving on all interfaces",
            config.ssid, config.channel
        );
        Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_join_succeeds() {
        let mut wifi = HostWifi::new();
        let credential = Credential::open("Anything").unwrap();
        assert!(wifi.join(&credential, Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_host_join_can_be_rejected() {
        let mut wifi = HostWifi {
            reject_joins: true,
        };
        let credential = Credential::open("Anything").unwrap();
        assert!(matches!(
            wifi.join(&credential, Duration::from_secs(1)),
            Err(JoinError::Rejected(_))
        ));
    }

    #[test]
    fn test_host_access_point_binds_everywhere() {
        let mut wifi = HostWifi::new();
        let ip = wifi
            .start_access_point(&AccessPointConfig::default())
            .unwrap();
        assert!(ip.is_unspecified());
    }
}
