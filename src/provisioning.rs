//! Boot-time provisioning.
//!
//! At boot the controller tries the saved credential once. If there is no
//! usable credential, or the join fails, it starts the configuration access
//! point and waits for a submission from either configuration channel (BLE or
//! the setup portal). Both channels end up in
//! [`ProvisioningController::submit_credential`], the only writer to the
//! credential store. A successful submission schedules a restart.
//!
//! ```text
//! Booting ──load ok──> TryingSaved ──join ok──> Connected
//!    │                      │
//!    └─ none/unusable ──────┴─ timeout/failure ──> ConfigMode ──saved──> AwaitingRestart
//! ```

use crate::config::{ConfigError, Credential, ProvisioningConfig};
use crate::indicator::Indicator;
use crate::storage::{CredentialStore, StoreError};
use crate::wifi::{JoinError, WifiDriver};
use log::{error, info, warn};
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Booting,
    TryingSaved,
    Connected,
    ConfigMode,
    AwaitingRestart,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Booting => "booting",
            Self::TryingSaved => "trying_saved",
            Self::Connected => "connected",
            Self::ConfigMode => "config_mode",
            Self::AwaitingRestart => "awaiting_restart",
        };
        f.write_str(name)
    }
}

/// Network connectivity as seen by the rest of the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectivityState {
    Unconfigured = 0,
    ConnectingToSaved = 1,
    Connected = 2,
    ConfigurationMode = 3,
}

impl ConnectivityState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ConnectingToSaved,
            2 => Self::Connected,
            3 => Self::ConfigurationMode,
            _ => Self::Unconfigured,
        }
    }

    /// `Connected` and `ConfigurationMode` are final for the process.
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Connected | Self::ConfigurationMode)
    }
}

/// Atomic connectivity cell. Once resolved it never changes again.
#[derive(Debug)]
pub struct Connectivity(AtomicU8);

impl Default for Connectivity {
    fn default() -> Self {
        Self(AtomicU8::new(ConnectivityState::Unconfigured as u8))
    }
}

impl Connectivity {
    pub fn get(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next`. Returns false if the cell was already resolved.
    fn advance(&self, next: ConnectivityState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if ConnectivityState::from_u8(current).is_resolved() {
                    None
                } else {
                    Some(next as u8)
                }
            })
            .is_ok()
    }
}

/// Device restart.
pub trait Restart: Send + Sync {
    fn restart(&self);
}

/// Why configuration mode was entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigReason {
    /// First boot: nothing saved.
    NoCredential,
    /// The store could not produce a valid credential.
    UnusableCredential(StoreError),
    /// The saved network could not be joined.
    JoinFailed(JoinError),
    /// Requested at boot (button held).
    Forced,
}

impl fmt::Display for ConfigReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredential => write!(f, "no saved credential"),
            Self::UnusableCredential(e) => write!(f, "{}", e),
            Self::JoinFailed(e) => write!(f, "{}", e),
            Self::Forced => write!(f, "configuration requested at boot"),
        }
    }
}

/// Result of [`ProvisioningController::boot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// Library mode.
    Connected { ip: IpAddr },
    /// Configuration mode. `ap_ip` is `None` when the access point could
    /// not be started (BLE remains available).
    ConfigMode {
        reason: ConfigReason,
        ap_ip: Option<IpAddr>,
    },
}

/// Boot errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootError {
    /// `boot` runs once per process.
    AlreadyBooted(ProvisioningState),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyBooted(state) => write!(f, "already booted (state: {})", state),
        }
    }
}

impl std::error::Error for BootError {}

/// Credential submission errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Submissions are only accepted in configuration mode.
    NotInConfigMode,
    /// A submission was already saved; the device is about to restart.
    RestartPending,
    /// The submitted values are not a valid credential.
    Invalid(ConfigError),
    /// The store rejected the write.
    Store(StoreError),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInConfigMode => write!(f, "not in configuration mode"),
            Self::RestartPending => write!(f, "credential already saved, restart pending"),
            Self::Invalid(e) => write!(f, "{}", e),
            Self::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Invalid(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SubmitError {
    fn from(e: ConfigError) -> Self {
        Self::Invalid(e)
    }
}

impl From<StoreError> for SubmitError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Provisioning state machine.
///
/// Shared as `Arc<ProvisioningController<_>>` between the boot path, the
/// portal workers and the BLE callbacks.
pub struct ProvisioningController<S: CredentialStore> {
    store: Mutex<S>,
    state: Mutex<ProvisioningState>,
    connectivity: Connectivity,
    indicator: Indicator,
    restart: Arc<dyn Restart>,
    config: ProvisioningConfig,
}

impl<S: CredentialStore> ProvisioningController<S> {
    pub fn new(
        store: S,
        indicator: Indicator,
        restart: Arc<dyn Restart>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            state: Mutex::new(ProvisioningState::Booting),
            connectivity: Connectivity::default(),
            indicator,
            restart,
            config,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ProvisioningState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_store(&self) -> MutexGuard<'_, S> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ProvisioningState {
        *self.lock_state()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity.get()
    }

    /// Resolve connectivity for this boot.
    ///
    /// With `force_config` the saved credential is ignored. Otherwise a
    /// saved credential gets exactly one join attempt bounded by
    /// `join_timeout`; a missing credential never touches the radio's
    /// station mode.
    pub fn boot<W>(&self, wifi: &mut W, force_config: bool) -> Result<BootOutcome, BootError>
    where
        W: WifiDriver + ?Sized,
    {
        {
            let mut state = self.lock_state();
            if *state != ProvisioningState::Booting {
                return Err(BootError::AlreadyBooted(*state));
            }
            if force_config {
                info!("Configuration mode requested at boot");
                *state = ProvisioningState::ConfigMode;
                drop(state);
                return Ok(self.enter_config_mode(wifi, ConfigReason::Forced));
            }
        }

        let loaded = self.lock_store().load();
        let credential = match loaded {
            Ok(credential) => {
                *self.lock_state() = ProvisioningState::TryingSaved;
                credential
            }
            Err(StoreError::NotFound) => {
                info!("No saved credential");
                *self.lock_state() = ProvisioningState::ConfigMode;
                return Ok(self.enter_config_mode(wifi, ConfigReason::NoCredential));
            }
            Err(e) => {
                warn!("Saved credential unusable: {}", e);
                *self.lock_state() = ProvisioningState::ConfigMode;
                return Ok(self.enter_config_mode(wifi, ConfigReason::UnusableCredential(e)));
            }
        };

        self.connectivity.advance(ConnectivityState::ConnectingToSaved);
        info!(
            "Joining saved network '{}' (timeout {:?})",
            credential.ssid, self.config.join_timeout
        );

        match wifi.join(&credential, self.config.join_timeout) {
            Ok(ip) => {
                *self.lock_state() = ProvisioningState::Connected;
                self.connectivity.advance(ConnectivityState::Connected);
                self.indicator.network_ready();
                info!("Connected to '{}', IP: {}", credential.ssid, ip);
                Ok(BootOutcome::Connected { ip })
            }
            Err(e) => {
                warn!("Could not join '{}': {}", credential.ssid, e);
                *self.lock_state() = ProvisioningState::ConfigMode;
                Ok(self.enter_config_mode(wifi, ConfigReason::JoinFailed(e)))
            }
        }
    }

    fn enter_config_mode<W>(&self, wifi: &mut W, reason: ConfigReason) -> BootOutcome
    where
        W: WifiDriver + ?Sized,
    {
        info!("Entering configuration mode: {}", reason);

        let ap_ip = match wifi.start_access_point(&self.config.access_point) {
            Ok(ip) => Some(ip),
            Err(e) => {
                error!("Access point failed to start: {}", e);
                None
            }
        };
        self.connectivity.advance(ConnectivityState::ConfigurationMode);
        self.indicator.enter_configuration_mode();

        BootOutcome::ConfigMode { reason, ap_ip }
    }

    /// Validate and persist a credential, then schedule a restart.
    ///
    /// Surrounding whitespace is dropped from the SSID, whichever channel
    /// it came from. The secret is stored as given.
    ///
    /// Concurrent submissions are serialized; the first one that saves wins
    /// and later ones get [`SubmitError::RestartPending`]. A store failure
    /// leaves the controller in configuration mode with no restart.
    pub fn submit_credential(&self, ssid: &str, secret: &str) -> Result<(), SubmitError> {
        let mut state = self.lock_state();
        match *state {
            ProvisioningState::ConfigMode => {}
            ProvisioningState::AwaitingRestart => return Err(SubmitError::RestartPending),
            _ => return Err(SubmitError::NotInConfigMode),
        }

        let credential = Credential::new(ssid.trim(), secret)?;

        if let Err(e) = self.lock_store().save(&credential) {
            error!("Saving credential for '{}' failed: {}", credential.ssid, e);
            return Err(e.into());
        }

        *state = ProvisioningState::AwaitingRestart;
        info!(
            "Credential for '{}' saved, restarting in {:?}",
            credential.ssid, self.config.restart_delay
        );
        self.schedule_restart();
        Ok(())
    }

    fn schedule_restart(&self) {
        let restart = self.restart.clone();
        let delay = self.config.restart_delay;
        let spawned = thread::Builder::new()
            .name("restart".into())
            .spawn(move || {
                thread::sleep(delay);
                restart.restart();
            });

        if let Err(e) = spawned {
            error!("Could not schedule restart ({}), restarting now", e);
            self.restart.restart();
        }
    }
}
