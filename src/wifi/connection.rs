//! ESP-IDF WiFi driver.
//!
//! The join is started non-blocking and polled until the interface is up or
//! the deadline passes, so a wrong or unreachable network costs exactly one
//! bounded wait.

use super::{JoinError, WifiDriver};
use crate::config::{AccessPointConfig, Credential};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
use esp_idf_sys::EspError;
use log::{info, warn};
use std::net::IpAddr;
use std::thread;
use std::time::{Duration, Instant};

/// Interval between link checks while joining.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// WiFi driver backed by `EspWifi`.
pub struct EspWifiDriver {
    wifi: EspWifi<'static>,
}

impl EspWifiDriver {
    /// Take the modem and create the driver.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop, nvs)?;
        Ok(Self { wifi })
    }

    fn driver_error(e: EspError) -> JoinError {
        JoinError::Driver(format!("{:?}", e))
    }
}

impl WifiDriver for EspWifiDriver {
    fn join(&mut self, credential: &Credential, timeout: Duration) -> Result<IpAddr, JoinError> {
        info!("Connecting to WiFi: {}", credential.ssid);

        let auth_method = if credential.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let config = Configuration::Client(ClientConfiguration {
            ssid: credential
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| JoinError::Rejected("invalid SSID".into()))?,
            password: credential
                .secret
                .as_str()
                .try_into()
                .map_err(|_| JoinError::Rejected("invalid secret".into()))?,
            auth_method,
            ..Default::default()
        });

        self.wifi
            .set_configuration(&config)
            .map_err(Self::driver_error)?;
        self.wifi.start().map_err(Self::driver_error)?;
        self.wifi.connect().map_err(Self::driver_error)?;

        let deadline = Instant::now() + timeout;
        loop {
            let up = self.wifi.is_connected().unwrap_or(false)
                && self.wifi.sta_netif().is_up().unwrap_or(false);
            if up {
                let ip_info = self
                    .wifi
                    .sta_netif()
                    .get_ip_info()
                    .map_err(Self::driver_error)?;
                if !ip_info.ip.is_unspecified() {
                    info!("Connected to WiFi, IP: {}", ip_info.ip);
                    return Ok(IpAddr::V4(ip_info.ip));
                }
            }

            if Instant::now() >= deadline {
                warn!("No address from '{}' within {:?}", credential.ssid, timeout);
                let _ = self.wifi.disconnect();
                let _ = self.wifi.stop();
                return Err(JoinError::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<IpAddr, JoinError> {
        let auth_method = if config.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let ap = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| JoinError::Rejected("access point SSID too long".into()))?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| JoinError::Rejected("access point password too long".into()))?,
            auth_method,
            channel: config.channel,
            max_connections: config.max_connections,
            ..Default::default()
        });

        let _ = self.wifi.stop();
        self.wifi.set_configuration(&ap).map_err(Self::driver_error)?;
        self.wifi.start().map_err(Self::driver_error)?;

        let ip_info = self
            .wifi
            .ap_netif()
            .get_ip_info()
            .map_err(Self::driver_error)?;
        info!(
            "Access point '{}' started on channel {}, IP: {}",
            config.ssid, config.channel, ip_info.ip
        );
        Ok(IpAddr::V4(ip_info.ip))
    }
}
