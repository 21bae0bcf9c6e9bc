//! Durable storage of the network credential.
//!
//! # Backends
//!
//! - [`nvs`] - ESP32 Non-Volatile Storage (ESP32 only)
//! - [`file`] - a single file, for host builds
//! - [`MemoryCredentialStore`] - volatile, for tests and dry runs
//!
//! A missing credential ([`StoreError::NotFound`]) is the normal first-boot
//! signal, not a failure.

mod file;
#[cfg(feature = "esp32")]
mod nvs;

pub use file::{default_credential_path, FileCredentialStore};
#[cfg(feature = "esp32")]
pub use nvs::NvsCredentialStore;

use crate::config::{ConfigError, Credential};
use std::fmt;

/// Persistence of exactly one [`Credential`].
pub trait CredentialStore: Send {
    /// Read the stored credential.
    fn load(&self) -> Result<Credential, StoreError>;

    /// Replace the stored credential.
    fn save(&mut self, credential: &Credential) -> Result<(), StoreError>;

    /// Remove the stored credential. Clearing an empty store succeeds.
    fn clear(&mut self) -> Result<(), StoreError>;
}

/// Credential store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Nothing has been saved yet.
    NotFound,
    /// The backend failed while reading.
    ReadError(String),
    /// The backend rejected or lost the write.
    WriteError(String),
    /// The stored record does not decode to a valid credential.
    Corrupt(ConfigError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no credential stored"),
            Self::ReadError(e) => write!(f, "credential read failed: {}", e),
            Self::WriteError(e) => write!(f, "credential write failed: {}", e),
            Self::Corrupt(e) => write!(f, "stored credential is corrupt: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Corrupt(e) => Some(e),
            _ => None,
        }
    }
}

/// In-memory store.
///
/// `fail_writes` makes every `save` fail, to exercise the "storage rejected
/// the write" path.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: Option<Credential>,
    /// Reject every write with [`StoreError::WriteError`].
    pub fail_writes: bool,
}

impl MemoryCredentialStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with a credential.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Some(credential),
            fail_writes: false,
        }
    }

    /// Store whose writes always fail.
    pub fn failing() -> Self {
        Self {
            credential: None,
            fail_writes: true,
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Credential, StoreError> {
        self.credential.clone().ok_or(StoreError::NotFound)
    }

    fn save(&mut self, credential: &Credential) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::WriteError("simulated write failure".into()));
        }
        self.credential = Some(credential.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.credential = None;
        Ok(())
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn load(&self) -> Result<Credential, StoreError> {
        (**self).load()
    }

    fn save(&mut self, credential: &Credential) -> Result<(), StoreError> {
        (**self).save(credential)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        (**self).clear()
    }
}
