//! Single-slot transfer engine.

use super::{
    is_valid_filename, FailureReason, Progress, TransferError, TransferJob, TransferReport,
    TransferStatus,
};
use crate::indicator::Indicator;
use crate::volumes::{MountHandle, Volume, Volumes};
use log::{debug, error, info, trace, warn};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Copy granularity.
pub const CHUNK_SIZE: usize = 4096;

#[derive(Debug)]
struct Slot {
    job: Option<TransferJob>,
    cancel: Option<CancellationToken>,
    next_id: u64,
}

/// Transfer engine. Clones share the same slot.
#[derive(Clone)]
pub struct TransferEngine {
    volumes: Arc<Volumes>,
    indicator: Indicator,
    slot: Arc<Mutex<Slot>>,
    chunk_pause: Duration,
    open_destination: OpenDestination,
}

impl fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferEngine")
            .field("volumes", &self.volumes)
            .field("indicator", &self.indicator)
            .field("slot", &self.slot)
            .field("chunk_pause", &self.chunk_pause)
            .finish_non_exhaustive()
    }
}

/// Destination file as seen by the copy loop.
trait Destination: Write + Send {
    fn sync(&mut self) -> io::Result<()>;
}

impl Destination for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

type OpenDestination = fn(&Path) -> io::Result<Box<dyn Destination>>;

fn create_file(path: &Path) -> io::Result<Box<dyn Destination>> {
    Ok(Box::new(File::create(path)?))
}

/// Everything the copy thread owns.
struct CopyJob {
    id: u64,
    reader: File,
    writer: Box<dyn Destination>,
    destination: PathBuf,
    source_mount: Arc<MountHandle>,
    destination_mount: Arc<MountHandle>,
    cancel: CancellationToken,
}

enum CopyOutcome {
    Done,
    Cancelled,
    Failed(FailureReason),
}

impl TransferEngine {
    pub fn new(volumes: Arc<Volumes>, indicator: Indicator) -> Self {
        Self {
            volumes,
            indicator,
            slot: Arc::new(Mutex::new(Slot {
                job: None,
                cancel: None,
                next_id: 1,
            })),
            chunk_pause: Duration::ZERO,
            open_destination: create_file,
        }
    }

    /// Sleep between chunks, leaving bus time to other tasks.
    pub fn with_chunk_pause(mut self, pause: Duration) -> Self {
        self.chunk_pause = pause;
        self
    }

    #[cfg(test)]
    fn with_destination(mut self, open: OpenDestination) -> Self {
        self.open_destination = open;
        self
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        lock(&self.slot)
    }

    /// Start copying `filename` from `source` to `destination`.
    ///
    /// All guards run before the slot changes, so a refused request never
    /// touches an active job. Refusals caused by a volume put the indicator
    /// into its error state; `Busy` and malformed requests leave it alone.
    pub fn begin_transfer(
        &self,
        source: Volume,
        destination: Volume,
        filename: &str,
    ) -> Result<TransferHandle, TransferError> {
        let result = self.try_begin(source, destination, filename);
        if let Err(e) = &result {
            if e.is_device_fault() {
                warn!("Transfer of {} refused: {}", filename, e);
                self.indicator.fault();
            }
        }
        result
    }

    fn try_begin(
        &self,
        source: Volume,
        destination: Volume,
        filename: &str,
    ) -> Result<TransferHandle, TransferError> {
        let mut slot = self.lock_slot();

        if matches!(&slot.job, Some(job) if job.status == TransferStatus::Active) {
            return Err(TransferError::Busy);
        }
        if !is_valid_filename(filename) {
            return Err(TransferError::InvalidName);
        }
        if source == destination {
            return Err(TransferError::SameVolume);
        }

        let source_mount = self
            .volumes
            .handle(source)
            .ok_or(TransferError::SourceUnavailable)?;
        let destination_mount = self
            .volumes
            .handle(destination)
            .ok_or(TransferError::DestinationUnavailable)?;

        let source_path = source_mount.root().join(filename);
        let reader = File::open(&source_path).map_err(|e| {
            debug!("Cannot open {:?}: {}", source_path, e);
            TransferError::SourceUnavailable
        })?;
        let metadata = reader
            .metadata()
            .map_err(|_| TransferError::SourceUnavailable)?;
        if !metadata.is_file() {
            return Err(TransferError::SourceUnavailable);
        }

        let destination_path = destination_mount.root().join(filename);
        let writer = (self.open_destination)(&destination_path).map_err(|e| {
            warn!("Cannot create {:?}: {}", destination_path, e);
            TransferError::DestinationOpenError
        })?;

        let id = slot.next_id;
        slot.next_id += 1;
        let cancel = CancellationToken::new();
        slot.job = Some(TransferJob {
            id,
            source,
            destination,
            filename: filename.to_string(),
            bytes_transferred: 0,
            total_bytes: metadata.len(),
            status: TransferStatus::Active,
        });
        slot.cancel = Some(cancel.clone());
        self.indicator.transfer_started();
        drop(slot);

        info!(
            "Transfer #{} started: {} {} -> {} ({} bytes)",
            id,
            filename,
            source,
            destination,
            metadata.len()
        );

        let job = CopyJob {
            id,
            reader,
            writer,
            destination: destination_path,
            source_mount,
            destination_mount,
            cancel,
        };
        let partial = job.destination.clone();
        let engine = self.clone();
        let spawned = thread::Builder::new()
            .name("transfer".into())
            .spawn(move || engine.run(job));

        match spawned {
            Ok(thread) => Ok(TransferHandle {
                id,
                engine: self.clone(),
                thread: Some(thread),
                report: None,
            }),
            Err(e) => {
                // The closure, and the files it owned, went down with the error
                error!("Cannot start transfer thread: {}", e);
                remove_partial(&partial);
                let report = self.finish(id, TransferStatus::Failed(FailureReason::WriteError));
                Ok(TransferHandle {
                    id,
                    engine: self.clone(),
                    thread: None,
                    report: Some(report),
                })
            }
        }
    }

    /// Cancel the active job. Returns false when nothing is active.
    pub fn cancel_transfer(&self) -> bool {
        let slot = self.lock_slot();
        match (&slot.job, &slot.cancel) {
            (Some(job), Some(cancel)) if job.status == TransferStatus::Active => {
                info!("Cancelling transfer #{}", job.id);
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Progress of the active job, `None` unless one is active.
    pub fn poll_progress(&self) -> Option<Progress> {
        let slot = self.lock_slot();
        slot.job
            .as_ref()
            .filter(|job| job.status == TransferStatus::Active)
            .map(|job| Progress {
                filename: job.filename.clone(),
                bytes_transferred: job.bytes_transferred,
                total_bytes: job.total_bytes,
            })
    }

    pub fn is_active(&self) -> bool {
        self.poll_progress().is_some()
    }

    /// The job in the slot, active or finished but not yet collected.
    pub fn current_job(&self) -> Option<TransferJob> {
        self.lock_slot().job.clone()
    }

    fn run(&self, mut job: CopyJob) -> TransferReport {
        let outcome = self.copy(&mut job);

        let status = match outcome {
            CopyOutcome::Done => match job.writer.flush().and_then(|_| job.writer.sync()) {
                Ok(()) => TransferStatus::Succeeded,
                Err(e) => {
                    warn!("Transfer #{}: sync failed: {}", job.id, e);
                    TransferStatus::Failed(FailureReason::WriteError)
                }
            },
            CopyOutcome::Cancelled => TransferStatus::Cancelled,
            CopyOutcome::Failed(reason) => TransferStatus::Failed(reason),
        };

        if status != TransferStatus::Succeeded {
            drop(job.writer);
            remove_partial(&job.destination);
        }

        self.finish(job.id, status)
    }

    fn copy(&self, job: &mut CopyJob) -> CopyOutcome {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut transferred: u64 = 0;

        loop {
            if job.cancel.is_cancelled() {
                return CopyOutcome::Cancelled;
            }
            if !job.source_mount.is_live() || !job.destination_mount.is_live() {
                warn!("Transfer #{}: device detached", job.id);
                return CopyOutcome::Failed(FailureReason::DeviceDetached);
            }

            let n = match job.reader.read(&mut buf) {
                Ok(0) => return CopyOutcome::Done,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Transfer #{}: read failed: {}", job.id, e);
                    return CopyOutcome::Failed(FailureReason::ReadError);
                }
            };

            if let Err(e) = job.writer.write_all(&buf[..n]) {
                warn!("Transfer #{}: write failed: {}", job.id, e);
                return CopyOutcome::Failed(FailureReason::WriteError);
            }

            transferred += n as u64;
            self.record_progress(job.id, transferred);

            if !self.chunk_pause.is_zero() {
                thread::sleep(self.chunk_pause);
            }
        }
    }

    fn record_progress(&self, id: u64, transferred: u64) {
        let mut slot = self.lock_slot();
        if let Some(job) = slot.job.as_mut().filter(|job| job.id == id) {
            job.bytes_transferred = transferred;
            // The source grew while copying
            if job.total_bytes != 0 && transferred > job.total_bytes {
                job.total_bytes = transferred;
            }
            trace!("Transfer #{}: {}/{}", id, transferred, job.total_bytes);
        }
    }

    /// Move job `id` to a terminal status.
    ///
    /// The indicator is updated before the job leaves `Active`.
    fn finish(&self, id: u64, status: TransferStatus) -> TransferReport {
        self.indicator
            .transfer_finished(matches!(status, TransferStatus::Failed(_)));

        let mut slot = self.lock_slot();
        slot.cancel = None;
        let report = match slot.job.as_mut().filter(|job| job.id == id) {
            Some(job) => {
                if status == TransferStatus::Succeeded {
                    job.total_bytes = job.bytes_transferred;
                }
                job.status = status;
                TransferReport {
                    id,
                    filename: job.filename.clone(),
                    bytes_transferred: job.bytes_transferred,
                    total_bytes: job.total_bytes,
                    status,
                }
            }
            None => TransferReport {
                id,
                filename: String::new(),
                bytes_transferred: 0,
                total_bytes: 0,
                status,
            },
        };

        info!(
            "Transfer #{} {}: {}/{} bytes",
            id, status, report.bytes_transferred, report.total_bytes
        );
        report
    }

    /// Clear the slot if it still holds job `id`.
    fn release(&self, id: u64) {
        let mut slot = self.lock_slot();
        if matches!(&slot.job, Some(job) if job.id == id && job.status.is_terminal()) {
            slot.job = None;
        }
    }
}

/// Handle to a started transfer.
#[derive(Debug)]
pub struct TransferHandle {
    id: u64,
    engine: TransferEngine,
    thread: Option<JoinHandle<TransferReport>>,
    report: Option<TransferReport>,
}

impl TransferHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the copy ends, then return the slot to `Idle`.
    pub fn wait(mut self) -> TransferReport {
        let report = match (self.thread.take(), self.report.take()) {
            (Some(thread), _) => match thread.join() {
                Ok(report) => report,
                Err(_) => {
                    error!("Transfer #{} thread panicked", self.id);
                    self.engine
                        .finish(self.id, TransferStatus::Failed(FailureReason::WriteError))
                }
            },
            (None, Some(report)) => report,
            (None, None) => self
                .engine
                .finish(self.id, TransferStatus::Failed(FailureReason::WriteError)),
        };

        self.engine.release(self.id);
        report
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial file {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove partial file {:?}: {}", path, e),
    }
}
