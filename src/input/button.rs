//! Button debouncing and the async button watcher.

use log::warn;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A press must stay down this long to count.
pub const DEBOUNCE_TIME: Duration = Duration::from_millis(50);

/// Edge-triggered digital input.
pub trait EdgeInput {
    /// Resolve on the next level change.
    fn wait_for_edge(&mut self) -> impl Future<Output = Result<(), InputError>> + Send;

    /// Current level, true while the button is held.
    fn is_pressed(&self) -> bool;
}

/// Input failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputError(pub String);

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "button input failed: {}", self.0)
    }
}

impl std::error::Error for InputError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceState {
    Idle,
    Pressed(Instant),
    Confirmed,
}

/// `Idle -> Pressed(t) -> Confirmed -> (release) Idle`.
///
/// A release before the debounce time elapses is a bounce and returns to
/// `Idle` without an event.
#[derive(Debug)]
pub struct Debouncer {
    state: DebounceState,
    debounce: Duration,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_TIME)
    }
}

impl Debouncer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: DebounceState::Idle,
            debounce,
        }
    }

    /// Feed a level change.
    pub fn edge(&mut self, pressed: bool, now: Instant) {
        self.state = match (self.state, pressed) {
            (DebounceState::Idle, true) => DebounceState::Pressed(now),
            (_, false) => DebounceState::Idle,
            (state, true) => state,
        };
    }

    /// Check the pending press. Returns true exactly once per press.
    pub fn poll(&mut self, pressed: bool, now: Instant) -> bool {
        match self.state {
            DebounceState::Pressed(since) if pressed && now >= since + self.debounce => {
                self.state = DebounceState::Confirmed;
                true
            }
            DebounceState::Pressed(_) if !pressed => {
                self.state = DebounceState::Idle;
                false
            }
            _ => false,
        }
    }

    /// When the pending press can be confirmed.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Pressed(since) => Some(since + self.debounce),
            _ => None,
        }
    }
}

enum Wake {
    Deadline,
    Edge(Result<(), InputError>),
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Watch `input` and call `on_press` once per debounced press until
/// `cancel` fires or the input fails.
pub async fn watch_button<I, F>(mut input: I, mut on_press: F, cancel: CancellationToken)
where
    I: EdgeInput + Send,
    F: FnMut() + Send,
{
    let mut debouncer = Debouncer::default();

    loop {
        let deadline = debouncer.deadline();
        let woke = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep_until_opt(deadline) => Wake::Deadline,
            result = input.wait_for_edge() => Wake::Edge(result),
        };

        let now = Instant::now();
        match woke {
            Wake::Deadline => {
                if debouncer.poll(input.is_pressed(), now) {
                    on_press();
                }
            }
            Wake::Edge(Ok(())) => debouncer.edge(input.is_pressed(), now),
            Wake::Edge(Err(e)) => {
                warn!("{}, button disabled", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    // ==================== Debouncer ====================

    #[test]
    fn test_press_confirmed_after_debounce() {
        let start = Instant::now();
        let mut debouncer = Debouncer::default();

        debouncer.edge(true, start);
        assert_eq!(debouncer.deadline(), Some(start + DEBOUNCE_TIME));
        assert!(!debouncer.poll(true, start + Duration::from_millis(20)));
        assert!(debouncer.poll(true, start + DEBOUNCE_TIME));
        // Only once per press
        assert!(!debouncer.poll(true, start + Duration::from_millis(200)));
        assert_eq!(debouncer.deadline(), None);
    }

    #[test]
    fn test_bounce_is_ignored() {
        let start = Instant::now();
        let mut debouncer = Debouncer::default();

        debouncer.edge(true, start);
        debouncer.edge(false, start + Duration::from_millis(10));
        assert_eq!(debouncer.deadline(), None);
        assert!(!debouncer.poll(false, start + Duration::from_millis(60)));
    }

    #[test]
    fn test_release_rearms() {
        let start = Instant::now();
        let mut debouncer = Debouncer::default();

        debouncer.edge(true, start);
        assert!(debouncer.poll(true, start + DEBOUNCE_TIME));
        debouncer.edge(false, start + Duration::from_millis(100));

        let again = start + Duration::from_millis(200);
        debouncer.edge(true, again);
        assert!(debouncer.poll(true, again + DEBOUNCE_TIME));
    }

    // ==================== Watcher ====================

    struct ScriptedInput {
        levels: mpsc::UnboundedReceiver<bool>,
        level: bool,
    }

    impl EdgeInput for ScriptedInput {
        fn wait_for_edge(&mut self) -> impl Future<Output = Result<(), InputError>> + Send {
            async move {
                match self.levels.recv().await {
                    Some(level) => {
                        self.level = level;
                        Ok(())
                    }
                    None => Err(InputError("closed".into())),
                }
            }
        }

        fn is_pressed(&self) -> bool {
            self.level
        }
    }

    fn spawn_watcher() -> (
        mpsc::UnboundedSender<bool>,
        Arc<AtomicUsize>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let presses = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let counter = presses.clone();
        let input = ScriptedInput {
            levels: rx,
            level: false,
        };
        let task = tokio::spawn(watch_button(
            input,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            cancel.clone(),
        ));
        (tx, presses, cancel, task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_reports_one_press_per_hold() {
        let (tx, presses, cancel, task) = spawn_watcher();

        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(presses.load(Ordering::SeqCst), 1);

        tx.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(presses.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_ignores_bounces() {
        let (tx, presses, cancel, task) = spawn_watcher();

        for _ in 0..3 {
            tx.send(true).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            tx.send(false).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(presses.load(Ordering::SeqCst), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_stops_when_input_fails() {
        let (tx, _presses, _cancel, task) = spawn_watcher();
        drop(tx);
        task.await.unwrap();
    }
}
