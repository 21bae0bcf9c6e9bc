//! Runtime settings for the appliance.
//!
//! Defaults match the hardware layout (SD card at `/sdcard`, USB reader at
//! `/usb`, web assets in SPIFFS). On host builds, `LIBRARIAN_*` environment
//! variables override individual values so the firmware logic can run against
//! ordinary directories.

use super::wifi::{ConfigError, MAX_SECRET_LEN, MAX_SSID_LEN, MIN_SECRET_LEN};
use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP port for both the library UI and the setup portal.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Number of HTTP worker threads.
///
/// One worker may be blocked by a running transfer, so at least two are
/// needed for progress polling and cancellation to stay responsive.
pub const DEFAULT_HTTP_WORKERS: usize = 3;

/// Access point advertised in configuration mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    /// Network name of the configuration network.
    pub ssid: String,
    /// WPA2 passphrase, or empty for an open network.
    pub password: String,
    /// 2.4 GHz channel.
    pub channel: u8,
    /// Maximum simultaneous stations.
    pub max_connections: u16,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: "Ebook-Library-Box".to_string(),
            password: "sharebooks".to_string(),
            channel: 1,
            max_connections: 4,
        }
    }
}

impl AccessPointConfig {
    /// Validate the access point parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() || self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::InvalidSetting("AP SSID must be 1-32 bytes"));
        }
        if !self.password.is_empty()
            && !(MIN_SECRET_LEN..=MAX_SECRET_LEN).contains(&self.password.len())
        {
            return Err(ConfigError::InvalidSetting("AP password must be 8-64 bytes"));
        }
        if !(1..=13).contains(&self.channel) {
            return Err(ConfigError::InvalidSetting("AP channel must be 1-13"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidSetting("AP must accept a station"));
        }
        Ok(())
    }
}

/// Timing used by the provisioning controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Single bounded wait for the saved-credential join.
    pub join_timeout: Duration,
    /// Delay between a saved submission and the restart, so the submitter
    /// still receives its acknowledgement.
    pub restart_delay: Duration,
    /// Configuration network started when no usable credential exists.
    pub access_point: AccessPointConfig,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(15),
            restart_delay: Duration::from_secs(2),
            access_point: AccessPointConfig::default(),
        }
    }
}

/// Appliance settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Mount point of the local SD card.
    pub sd_root: PathBuf,
    /// Mount point of the removable reader.
    pub usb_root: PathBuf,
    /// Directory with optional static web assets.
    pub web_root: Option<PathBuf>,
    /// HTTP listen port.
    pub http_port: u16,
    /// HTTP worker threads.
    pub http_workers: usize,
    /// How often the mount watcher checks for the reader.
    pub mount_poll_interval: Duration,
    /// Credential file used by host builds.
    pub credential_path: Option<PathBuf>,
    /// Provisioning timing and access point.
    pub provisioning: ProvisioningConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sd_root: PathBuf::from("/sdcard"),
            usb_root: PathBuf::from("/usb"),
            web_root: Some(PathBuf::from("/spiffs")),
            http_port: DEFAULT_HTTP_PORT,
            http_workers: DEFAULT_HTTP_WORKERS,
            mount_poll_interval: Duration::from_millis(500),
            credential_path: None,
            provisioning: ProvisioningConfig::default(),
        }
    }
}

impl Settings {
    /// Defaults with `LIBRARIAN_*` environment overrides applied.
    ///
    /// Recognised variables: `LIBRARIAN_SD_ROOT`, `LIBRARIAN_USB_ROOT`,
    /// `LIBRARIAN_WEB_ROOT`, `LIBRARIAN_HTTP_PORT`, `LIBRARIAN_CREDENTIALS`,
    /// `LIBRARIAN_JOIN_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(v) = lookup("LIBRARIAN_SD_ROOT") {
            settings.sd_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("LIBRARIAN_USB_ROOT") {
            settings.usb_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("LIBRARIAN_WEB_ROOT") {
            settings.web_root = if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        if let Some(v) = lookup("LIBRARIAN_HTTP_PORT") {
            settings.http_port = v
                .parse()
                .map_err(|_| ConfigError::InvalidSetting("LIBRARIAN_HTTP_PORT is not a port"))?;
        }
        if let Some(v) = lookup("LIBRARIAN_CREDENTIALS") {
            settings.credential_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LIBRARIAN_JOIN_TIMEOUT_SECS") {
            let secs: u64 = v.parse().map_err(|_| {
                ConfigError::InvalidSetting("LIBRARIAN_JOIN_TIMEOUT_SECS is not a number")
            })?;
            settings.provisioning.join_timeout = Duration::from_secs(secs);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validate all values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sd_root == self.usb_root {
            return Err(ConfigError::InvalidSetting(
                "SD and USB mount points must differ",
            ));
        }
        if self.http_workers < 2 {
            return Err(ConfigError::InvalidSetting("http_workers must be >= 2"));
        }
        if self.mount_poll_interval.is_zero() {
            return Err(ConfigError::InvalidSetting(
                "mount_poll_interval must be > 0",
            ));
        }
        if self.provisioning.join_timeout.is_zero() {
            return Err(ConfigError::InvalidSetting("join_timeout must be > 0"));
        }
        self.provisioning.access_point.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.sd_root, PathBuf::from("/sdcard"));
        assert_eq!(settings.usb_root, PathBuf::from("/usb"));
        assert_eq!(settings.provisioning.access_point.ssid, "Ebook-Library-Box");
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("LIBRARIAN_SD_ROOT", "/tmp/sd"),
            ("LIBRARIAN_USB_ROOT", "/tmp/usb"),
            ("LIBRARIAN_WEB_ROOT", ""),
            ("LIBRARIAN_HTTP_PORT", "8080"),
            ("LIBRARIAN_JOIN_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();

        assert_eq!(settings.sd_root, PathBuf::from("/tmp/sd"));
        assert_eq!(settings.usb_root, PathBuf::from("/tmp/usb"));
        assert_eq!(settings.web_root, None);
        assert_eq!(settings.http_port, 8080);
        assert_eq!(settings.provisioning.join_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_bad_port_rejected() {
        let result = Settings::from_lookup(lookup_from(&[("LIBRARIAN_HTTP_PORT", "http")]));
        assert!(matches!(result, Err(ConfigError::InvalidSetting(_))));
    }

    #[test]
    fn test_same_mount_points_rejected() {
        let result = Settings::from_lookup(lookup_from(&[
            ("LIBRARIAN_SD_ROOT", "/data"),
            ("LIBRARIAN_USB_ROOT", "/data"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidSetting(_))));
    }

    #[test]
    fn test_single_worker_rejected() {
        let settings = Settings {
            http_workers: 1,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_access_point_validation() {
        let mut ap = AccessPointConfig::default();
        assert!(ap.validate().is_ok());

        ap.password = "short".to_string();
        assert!(ap.validate().is_err());

        ap.password.clear();
        assert!(ap.validate().is_ok());

        ap.channel = 14;
        assert!(ap.validate().is_err());
    }
}
