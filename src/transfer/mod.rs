//! File transfer between the SD card and the reader.
//!
//! At most one copy runs at a time. The copy loop runs on its own thread so
//! HTTP workers stay free to poll progress and cancel.
//!
//! # Example
//!
//! ```
//! use ebook_librarian::indicator::Indicator;
//! use ebook_librarian::transfer::{TransferEngine, TransferError};
//! use ebook_librarian::volumes::{Volume, Volumes};
//! use std::sync::Arc;
//!
//! let volumes = Arc::new(Volumes::new(std::env::temp_dir()));
//! let engine = TransferEngine::new(volumes, Indicator::new());
//!
//! // No reader attached
//! let result = engine.begin_transfer(Volume::Sd, Volume::Usb, "book.epub");
//! assert!(matches!(result, Err(TransferError::DestinationUnavailable)));
//! ```

mod engine;

pub use engine::{TransferEngine, TransferHandle, CHUNK_SIZE};

use crate::volumes::Volume;
use serde::Serialize;
use std::fmt;

/// Why a started transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ReadError,
    WriteError,
    DeviceDetached,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadError => write!(f, "read error"),
            Self::WriteError => write!(f, "write error"),
            Self::DeviceDetached => write!(f, "device detached"),
        }
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Idle,
    Active,
    Succeeded,
    Failed(FailureReason),
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The job in the engine's single slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub id: u64,
    pub source: Volume,
    pub destination: Volume,
    pub filename: String,
    pub bytes_transferred: u64,
    /// Source size, 0 when unknown.
    pub total_bytes: u64,
    pub status: TransferStatus,
}

/// Snapshot of an active job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub filename: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// Final result handed to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub id: u64,
    pub filename: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub status: TransferStatus,
}

impl TransferReport {
    pub fn succeeded(&self) -> bool {
        self.status == TransferStatus::Succeeded
    }

    /// Message for the requester.
    pub fn message(&self) -> String {
        match self.status {
            TransferStatus::Succeeded => "File transfer complete!".to_string(),
            TransferStatus::Cancelled => "File transfer cancelled.".to_string(),
            TransferStatus::Failed(reason) => format!("File transfer failed: {}.", reason),
            TransferStatus::Idle | TransferStatus::Active => "File transfer failed.".to_string(),
        }
    }
}

/// Reasons a transfer is refused before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// Another transfer is active.
    Busy,
    /// Empty, `.`/`..`, or contains a path separator.
    InvalidName,
    /// Source and destination are the same volume.
    SameVolume,
    /// Source volume not mounted, or the file cannot be opened.
    SourceUnavailable,
    /// Destination volume not mounted.
    DestinationUnavailable,
    /// Destination file cannot be created.
    DestinationOpenError,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "another transfer is in progress"),
            Self::InvalidName => write!(f, "invalid file name"),
            Self::SameVolume => write!(f, "source and destination are the same"),
            Self::SourceUnavailable => write!(f, "source file is not available"),
            Self::DestinationUnavailable => write!(f, "destination is not connected"),
            Self::DestinationOpenError => write!(f, "cannot create destination file"),
        }
    }
}

impl TransferError {
    /// Refusals caused by the volumes rather than the request. These are
    /// shown on the indicator.
    pub fn is_device_fault(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable | Self::DestinationUnavailable | Self::DestinationOpenError
        )
    }
}

impl std::error::Error for TransferError {}

/// A bare file name: no separators, no `.`/`..`, no NUL.
pub fn is_valid_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_validation() {
        assert!(is_valid_filename("Moby Dick.epub"));
        assert!(is_valid_filename(".hidden.txt"));
        assert!(!is_valid_filename(""));
        assert!(!is_valid_filename("."));
        assert!(!is_valid_filename(".."));
        assert!(!is_valid_filename("../etc/passwd"));
        assert!(!is_valid_filename("dir/book.pdf"));
        assert!(!is_valid_filename("dir\\book.pdf"));
        assert!(!is_valid_filename("bad\0name"));
    }

    #[test]
    fn test_report_messages() {
        let mut report = TransferReport {
            id: 1,
            filename: "a.txt".into(),
            bytes_transferred: 3,
            total_bytes: 3,
            status: TransferStatus::Succeeded,
        };
        assert!(report.succeeded());
        assert_eq!(report.message(), "File transfer complete!");

        report.status = TransferStatus::Failed(FailureReason::DeviceDetached);
        assert!(!report.succeeded());
        assert!(report.message().contains("device detached"));
    }
}
