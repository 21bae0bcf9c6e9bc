//! Physical button.
//!
//! - [`button`] - debounce machine and async watcher (host-testable)
//! - [`gpio`] - GPIO push button (ESP32 only)

mod button;
#[cfg(feature = "esp32")]
mod gpio;

pub use button::{watch_button, Debouncer, EdgeInput, InputError, DEBOUNCE_TIME};
#[cfg(feature = "esp32")]
pub use gpio::GpioButton;

use crate::indicator::Indicator;
use crate::transfer::TransferEngine;
use log::info;

/// What a press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// The active transfer was cancelled.
    CancelledTransfer,
    /// Feedback shown (also acknowledges an error).
    Feedback,
    /// Nothing to do in the current state.
    Ignored,
}

/// Library-mode press action: cancel a running transfer, otherwise
/// acknowledge with indicator feedback.
pub fn handle_press(transfer: &TransferEngine, indicator: &Indicator) -> PressOutcome {
    if transfer.cancel_transfer() {
        info!("Button: transfer cancelled");
        PressOutcome::CancelledTransfer
    } else if indicator.user_action() {
        PressOutcome::Feedback
    } else {
        PressOutcome::Ignored
    }
}
