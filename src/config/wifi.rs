//! WiFi credential types shared by both configuration channels.
//!
//! Everything here is platform-independent and host-testable.
//!
//! # Example
//!
//! ```
//! use ebook_librarian::config::{CommitCommand, Credential};
//!
//! let credential = Credential::new("HomeNetwork", "hunter2hunter2").unwrap();
//! assert!(!credential.is_open());
//!
//! let cmd: CommitCommand = "save".parse().unwrap();
//! assert_eq!(cmd, CommitCommand::Save);
//! ```

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum passphrase length for WPA2.
pub const MAX_SECRET_LEN: usize = 64;

/// Minimum passphrase length for WPA2.
pub const MIN_SECRET_LEN: usize = 8;

/// A network credential: SSID plus secret.
///
/// The secret is wiped from memory when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    /// Network name (1-32 bytes).
    pub ssid: String,
    /// Passphrase (8-64 bytes for WPA2, empty for open networks).
    pub secret: String,
}

impl Credential {
    /// Create a validated credential.
    pub fn new(ssid: impl Into<String>, secret: impl Into<String>) -> Result<Self, ConfigError> {
        let credential = Self {
            ssid: ssid.into(),
            secret: secret.into(),
        };
        credential.validate()?;
        Ok(credential)
    }

    /// Create a credential for an open network.
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(ssid, String::new())
    }

    /// Validate SSID and secret lengths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }

        // Empty secret means an open network
        if !self.secret.is_empty() && self.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort {
                len: self.secret.len(),
                min: MIN_SECRET_LEN,
            });
        }
        if self.secret.len() > MAX_SECRET_LEN {
            return Err(ConfigError::SecretTooLong {
                len: self.secret.len(),
                max: MAX_SECRET_LEN,
            });
        }

        Ok(())
    }

    /// True when no secret is set.
    pub fn is_open(&self) -> bool {
        self.secret.is_empty()
    }

    /// Serialize for persistence.
    ///
    /// Format: `[ssid_len:1][ssid:N][secret_len:1][secret:M]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.ssid.len() + self.secret.len());
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.secret.len() as u8);
        bytes.extend_from_slice(self.secret.as_bytes());
        bytes
    }

    /// Deserialize and validate a persisted record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let (&ssid_len, rest) = bytes
            .split_first()
            .ok_or_else(|| ConfigError::InvalidFormat("empty record".into()))?;
        let ssid_len = ssid_len as usize;
        if rest.len() < ssid_len + 1 {
            return Err(ConfigError::InvalidFormat("truncated SSID".into()));
        }

        let ssid = std::str::from_utf8(&rest[..ssid_len])
            .map_err(|_| ConfigError::InvalidFormat("SSID is not UTF-8".into()))?;

        let secret_len = rest[ssid_len] as usize;
        let secret_bytes = &rest[ssid_len + 1..];
        if secret_bytes.len() < secret_len {
            return Err(ConfigError::InvalidFormat("truncated secret".into()));
        }
        if secret_bytes.len() > secret_len {
            return Err(ConfigError::InvalidFormat("trailing bytes".into()));
        }

        let secret = std::str::from_utf8(secret_bytes)
            .map_err(|_| ConfigError::InvalidFormat("secret is not UTF-8".into()))?;

        Self::new(ssid, secret)
    }
}

// Keep the secret out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("ssid", &self.ssid)
            .field("secret", &format_args!("<{} bytes>", self.secret.len()))
            .finish()
    }
}

/// Provisioning status as reported on the BLE status characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStatus {
    /// Configuration mode, waiting for a submission.
    ConfigMode,
    /// Credential stored; the device restarts shortly.
    Saved,
    /// Submission rejected or storage failed.
    Failed { reason: String },
}

impl ProvisionStatus {
    /// Convert status to a string for BLE transmission.
    pub fn to_ble_string(&self) -> String {
        match self {
            Self::ConfigMode => "config_mode".to_string(),
            Self::Saved => "saved".to_string(),
            Self::Failed { reason } => format!("failed:{}", reason),
        }
    }
}

impl fmt::Display for ProvisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ble_string())
    }
}

/// Values accepted by the BLE commit-trigger characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitCommand {
    /// Submit the pending SSID and secret.
    Save,
    /// Discard the pending fields.
    Clear,
}

impl CommitCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Clear => "clear",
        }
    }
}

impl std::str::FromStr for CommitCommand {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "save" | "commit" | "1" => Ok(Self::Save),
            "clear" => Ok(Self::Clear),
            _ => Err(ConfigError::UnknownCommand(s.to_string())),
        }
    }
}

impl fmt::Display for CommitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while validating or decoding configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Secret is too short for WPA2.
    SecretTooShort { len: usize, min: usize },
    /// Secret exceeds maximum length.
    SecretTooLong { len: usize, max: usize },
    /// Invalid data format during deserialization.
    InvalidFormat(String),
    /// Unknown commit command.
    UnknownCommand(String),
    /// A settings value is out of range.
    InvalidSetting(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "network name cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "network name too long: {} bytes (max {})", len, max)
            }
            Self::SecretTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::SecretTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
            Self::UnknownCommand(cmd) => write!(f, "unknown command: {}", cmd),
            Self::InvalidSetting(msg) => write!(f, "invalid setting: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
