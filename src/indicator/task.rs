//! Indicator render task and LED output.

use super::pattern::{Renderer, Rgb};
use super::Indicator;
use log::{trace, warn};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// LED output.
pub trait LedStrip {
    /// Show one colour on every pixel.
    fn show(&mut self, color: Rgb) -> Result<(), LedError>;
}

/// LED output failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedError(pub String);

impl fmt::Display for LedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LED output failed: {}", self.0)
    }
}

impl std::error::Error for LedError {}

/// Host stand-in that logs colour changes.
#[derive(Debug, Default)]
pub struct LogStrip {
    last: Option<Rgb>,
}

impl LogStrip {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedStrip for LogStrip {
    fn show(&mut self, color: Rgb) -> Result<(), LedError> {
        if self.last != Some(color) {
            trace!("LED #{:02x}{:02x}{:02x}", color.r, color.g, color.b);
            self.last = Some(color);
        }
        Ok(())
    }
}

/// Render the indicator until `cancel` fires.
///
/// Each iteration takes one state snapshot, shows the frame and holds it for
/// the frame's duration before the next snapshot.
pub async fn run_indicator<L>(indicator: Indicator, mut strip: L, cancel: CancellationToken)
where
    L: LedStrip + Send + 'static,
{
    let mut renderer = Renderer::new();
    let mut output_failed = false;

    loop {
        let state = indicator.snapshot();
        let frame = renderer.next_frame(state);

        match strip.show(frame.color) {
            Ok(()) => output_failed = false,
            Err(e) if !output_failed => {
                warn!("{}", e);
                output_failed = true;
            }
            Err(_) => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(frame.hold) => {}
        }

        if frame.sequence_done {
            indicator.expire_feedback();
        }
    }

    let _ = strip.show(Rgb::OFF);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::IndicatorState;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingStrip {
        shown: Arc<Mutex<Vec<Rgb>>>,
    }

    impl LedStrip for RecordingStrip {
        fn show(&mut self, color: Rgb) -> Result<(), LedError> {
            self.shown.lock().unwrap().push(color);
            Ok(())
        }
    }

    struct BrokenStrip;

    impl LedStrip for BrokenStrip {
        fn show(&mut self, _color: Rgb) -> Result<(), LedError> {
            Err(LedError("disconnected".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_feedback_expires_after_blinks() {
        let indicator = Indicator::new();
        indicator.device_changed(true);
        indicator.network_ready();
        assert!(indicator.user_action());

        let strip = RecordingStrip::default();
        let shown = strip.shown.clone();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_indicator(indicator.clone(), strip, cancel.clone()));

        // 6 frames of 120 ms
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(indicator.snapshot(), IndicatorState::DeviceReady);

        cancel.cancel();
        task.await.unwrap();

        let shown = shown.lock().unwrap();
        let cyan = shown.iter().filter(|c| **c == Rgb::new(0, 255, 255)).count();
        assert_eq!(cyan, 3);
        assert!(shown.contains(&Rgb::new(0, 128, 0)));
        assert_eq!(shown.last(), Some(&Rgb::OFF));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_follows_state_changes() {
        let indicator = Indicator::new();
        let strip = RecordingStrip::default();
        let shown = strip.shown.clone();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_indicator(indicator.clone(), strip, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        indicator.network_ready();
        indicator.fault();
        tokio::time::sleep(Duration::from_millis(600)).await;

        cancel.cancel();
        task.await.unwrap();

        let shown = shown.lock().unwrap();
        // Booting renders dark, then the error colour appears
        assert_eq!(shown[0], Rgb::OFF);
        assert!(shown.contains(&Rgb::new(128, 0, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_errors_do_not_stop_rendering() {
        let indicator = Indicator::new();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_indicator(indicator, BrokenStrip, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        task.await.unwrap();
    }
}
