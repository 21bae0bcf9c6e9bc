//! Status indicator.
//!
//! One process-wide [`IndicatorState`] is owned by [`Indicator`]. Components
//! change it through the transition operations below; [`run_indicator`]
//! reads one snapshot per frame and turns it into LED output using the rule
//! table behind [`pattern_for`].

mod pattern;
mod task;
#[cfg(feature = "esp32")]
mod ws2812;

pub use pattern::{pattern_for, Frame, Pattern, Renderer, Rgb};
pub use task::{run_indicator, LedError, LedStrip, LogStrip};
#[cfg(feature = "esp32")]
pub use ws2812::Ws2812Strip;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// What the status LED is currently telling the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorState {
    /// Startup, before provisioning resolves.
    Booting,
    /// Library mode, no reader attached.
    AwaitingDevice,
    /// Library mode, reader attached.
    DeviceReady,
    /// A file copy is running.
    TransferInProgress,
    /// The last operation failed.
    Error,
    /// Waiting for network credentials.
    ConfigurationMode,
    /// Short acknowledgement of a button press.
    UserActionFeedback,
}

impl fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Booting => "booting",
            Self::AwaitingDevice => "awaiting_device",
            Self::DeviceReady => "device_ready",
            Self::TransferInProgress => "transfer_in_progress",
            Self::Error => "error",
            Self::ConfigurationMode => "configuration_mode",
            Self::UserActionFeedback => "user_action_feedback",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Inner {
    state: IndicatorState,
    device_attached: bool,
}

impl Inner {
    fn resting(&self) -> IndicatorState {
        if self.device_attached {
            IndicatorState::DeviceReady
        } else {
            IndicatorState::AwaitingDevice
        }
    }

    fn set(&mut self, state: IndicatorState) {
        if self.state != state {
            log::debug!("Indicator {} -> {}", self.state, state);
            self.state = state;
        }
    }
}

/// Shared handle to the indicator state.
///
/// Cloning is cheap; all clones see the same state.
#[derive(Debug, Clone)]
pub struct Indicator {
    inner: Arc<Mutex<Inner>>,
}

impl Default for Indicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Indicator {
    /// New indicator in [`IndicatorState::Booting`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: IndicatorState::Booting,
                device_attached: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State is always left consistent, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state.
    pub fn snapshot(&self) -> IndicatorState {
        self.lock().state
    }

    /// Whether a reader is attached.
    pub fn device_attached(&self) -> bool {
        self.lock().device_attached
    }

    /// Network joined: leave `Booting` for the resting state.
    pub fn network_ready(&self) {
        let mut inner = self.lock();
        if inner.state == IndicatorState::Booting {
            let resting = inner.resting();
            inner.set(resting);
        }
    }

    /// Configuration mode lasts until restart.
    pub fn enter_configuration_mode(&self) {
        self.lock().set(IndicatorState::ConfigurationMode);
    }

    /// Reader attached or detached.
    ///
    /// The attachment is always recorded, but it does not override
    /// `Booting`, `TransferInProgress` or `ConfigurationMode`.
    pub fn device_changed(&self, attached: bool) {
        let mut inner = self.lock();
        inner.device_attached = attached;
        match inner.state {
            IndicatorState::Booting
            | IndicatorState::TransferInProgress
            | IndicatorState::ConfigurationMode => {}
            _ => {
                let resting = inner.resting();
                inner.set(resting);
            }
        }
    }

    /// A transfer became active.
    pub fn transfer_started(&self) {
        let mut inner = self.lock();
        if inner.state != IndicatorState::ConfigurationMode {
            inner.set(IndicatorState::TransferInProgress);
        }
    }

    /// The active transfer ended.
    pub fn transfer_finished(&self, failed: bool) {
        let mut inner = self.lock();
        if inner.state == IndicatorState::ConfigurationMode {
            return;
        }
        let next = if failed {
            IndicatorState::Error
        } else {
            inner.resting()
        };
        inner.set(next);
    }

    /// Show press feedback. Returns false when the current state does not
    /// allow it (booting, configuring or transferring).
    pub fn user_action(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            IndicatorState::AwaitingDevice
            | IndicatorState::DeviceReady
            | IndicatorState::Error => {
                inner.set(IndicatorState::UserActionFeedback);
                true
            }
            _ => false,
        }
    }

    /// End press feedback, if it is still showing.
    pub fn expire_feedback(&self) {
        let mut inner = self.lock();
        if inner.state == IndicatorState::UserActionFeedback {
            let resting = inner.resting();
            inner.set(resting);
        }
    }

    /// Unrecoverable component failure.
    pub fn fault(&self) {
        let mut inner = self.lock();
        if inner.state != IndicatorState::ConfigurationMode {
            inner.set(IndicatorState::Error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(attached: bool) -> Indicator {
        let indicator = Indicator::new();
        indicator.device_changed(attached);
        indicator.network_ready();
        indicator
    }

    #[test]
    fn test_starts_booting() {
        assert_eq!(Indicator::new().snapshot(), IndicatorState::Booting);
    }

    #[test]
    fn test_attach_during_boot_is_remembered() {
        let indicator = Indicator::new();
        indicator.device_changed(true);
        assert_eq!(indicator.snapshot(), IndicatorState::Booting);

        indicator.network_ready();
        assert_eq!(indicator.snapshot(), IndicatorState::DeviceReady);
    }

    #[test]
    fn test_attach_and_detach() {
        let indicator = ready(false);
        assert_eq!(indicator.snapshot(), IndicatorState::AwaitingDevice);

        indicator.device_changed(true);
        assert_eq!(indicator.snapshot(), IndicatorState::DeviceReady);

        indicator.device_changed(false);
        assert_eq!(indicator.snapshot(), IndicatorState::AwaitingDevice);
    }

    #[test]
    fn test_detach_does_not_override_transfer() {
        let indicator = ready(true);
        indicator.transfer_started();
        indicator.device_changed(false);
        assert_eq!(indicator.snapshot(), IndicatorState::TransferInProgress);

        indicator.transfer_finished(true);
        assert_eq!(indicator.snapshot(), IndicatorState::Error);
    }

    #[test]
    fn test_transfer_success_returns_to_resting() {
        let indicator = ready(true);
        indicator.transfer_started();
        indicator.transfer_finished(false);
        assert_eq!(indicator.snapshot(), IndicatorState::DeviceReady);
    }

    #[test]
    fn test_configuration_mode_is_sticky() {
        let indicator = Indicator::new();
        indicator.enter_configuration_mode();

        indicator.device_changed(true);
        indicator.transfer_started();
        indicator.fault();
        assert!(!indicator.user_action());
        assert_eq!(indicator.snapshot(), IndicatorState::ConfigurationMode);
    }

    #[test]
    fn test_attach_clears_error() {
        let indicator = ready(false);
        indicator.fault();
        assert_eq!(indicator.snapshot(), IndicatorState::Error);

        indicator.device_changed(true);
        assert_eq!(indicator.snapshot(), IndicatorState::DeviceReady);
    }

    #[test]
    fn test_user_action_feedback_expires_to_resting() {
        let indicator = ready(true);
        assert!(indicator.user_action());
        assert_eq!(indicator.snapshot(), IndicatorState::UserActionFeedback);

        indicator.expire_feedback();
        assert_eq!(indicator.snapshot(), IndicatorState::DeviceReady);
    }

    #[test]
    fn test_user_action_refused_while_booting_or_transferring() {
        let indicator = Indicator::new();
        assert!(!indicator.user_action());

        indicator.network_ready();
        indicator.transfer_started();
        assert!(!indicator.user_action());
    }

    #[test]
    fn test_expire_is_noop_outside_feedback() {
        let indicator = ready(false);
        indicator.fault();
        indicator.expire_feedback();
        assert_eq!(indicator.snapshot(), IndicatorState::Error);
    }

    #[test]
    fn test_clones_share_state() {
        let indicator = Indicator::new();
        let clone = indicator.clone();
        clone.enter_configuration_mode();
        assert_eq!(indicator.snapshot(), IndicatorState::ConfigurationMode);
    }
}
