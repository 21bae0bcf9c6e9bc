//! Mounted storage volumes.
//!
//! The SD card is mounted for the life of the process. The USB reader comes
//! and goes: every attach creates a fresh [`MountHandle`] and every detach
//! retires it, so an operation holding an old handle can tell that its
//! device has gone away.

use crate::indicator::Indicator;
use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One of the two storage locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Volume {
    /// Local SD card.
    Sd,
    /// Removable e-reader.
    Usb,
}

impl Volume {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sd => "sd",
            Self::Usb => "usb",
        }
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown volume name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVolume(pub String);

impl fmt::Display for UnknownVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown volume '{}' (expected sd or usb)", self.0)
    }
}

impl std::error::Error for UnknownVolume {}

impl FromStr for Volume {
    type Err = UnknownVolume;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sd" => Ok(Self::Sd),
            "usb" => Ok(Self::Usb),
            _ => Err(UnknownVolume(s.to_string())),
        }
    }
}

/// A mounted root. Retired handles stay readable but report `!is_live()`.
#[derive(Debug)]
pub struct MountHandle {
    root: PathBuf,
    live: AtomicBool,
}

impl MountHandle {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            live: AtomicBool::new(true),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn retire(&self) {
        self.live.store(false, Ordering::Release);
    }
}

/// SD and USB mount state.
#[derive(Debug)]
pub struct Volumes {
    sd: Arc<MountHandle>,
    usb: RwLock<Option<Arc<MountHandle>>>,
}

impl Volumes {
    /// SD mounted at `sd_root`, no reader attached.
    pub fn new(sd_root: impl Into<PathBuf>) -> Self {
        Self {
            sd: Arc::new(MountHandle::new(sd_root.into())),
            usb: RwLock::new(None),
        }
    }

    /// Reader mounted at `root`. Any previous handle is retired.
    pub fn attach(&self, root: impl Into<PathBuf>) -> Arc<MountHandle> {
        let handle = Arc::new(MountHandle::new(root.into()));
        let mut usb = self.usb.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = usb.replace(handle.clone()) {
            old.retire();
        }
        info!("Reader attached at {:?}", handle.root());
        handle
    }

    /// Reader removed. Returns false if none was attached.
    pub fn detach(&self) -> bool {
        let mut usb = self.usb.write().unwrap_or_else(|e| e.into_inner());
        match usb.take() {
            Some(old) => {
                old.retire();
                info!("Reader detached from {:?}", old.root());
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.usb
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Borrow the handle for a volume, if mounted.
    pub fn handle(&self, volume: Volume) -> Option<Arc<MountHandle>> {
        match volume {
            Volume::Sd => Some(self.sd.clone()),
            Volume::Usb => self
                .usb
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

/// Poll the reader mount point and turn appearance and disappearance into
/// attach/detach calls plus indicator updates.
pub async fn watch_mounts(
    volumes: Arc<Volumes>,
    usb_root: PathBuf,
    indicator: Indicator,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_error = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let present = match std::fs::metadata(&usb_root) {
            Ok(meta) => {
                last_error = false;
                meta.is_dir()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                if !last_error {
                    warn!("Checking {:?} failed: {}", usb_root, e);
                    last_error = true;
                }
                false
            }
        };

        if present != volumes.is_attached() {
            if present {
                volumes.attach(&usb_root);
            } else {
                volumes.detach();
            }
            indicator.device_changed(present);
        }
    }
}
