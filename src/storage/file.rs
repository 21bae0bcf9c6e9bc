//! File-backed credential store for host builds.
//!
//! Uses `~/.ebook-librarian/wifi.cred` by default. The record format is the
//! same as the one written to NVS.

use super::{CredentialStore, StoreError};
use crate::config::Credential;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

/// Get the default credential file path.
///
/// Returns `~/.ebook-librarian/wifi.cred`
pub fn default_credential_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home)
        .join(".ebook-librarian")
        .join("wifi.cred"))
}

/// Credential store backed by one file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store at a specific path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at [`default_credential_path`].
    pub fn open_default() -> io::Result<Self> {
        Ok(Self::new(default_credential_path()?))
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Credential, StoreError> {
        let mut bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No credential file at {:?}", self.path);
                return Err(StoreError::NotFound);
            }
            Err(e) => return Err(StoreError::ReadError(e.to_string())),
        };

        let result = Credential::from_bytes(&bytes).map_err(StoreError::Corrupt);
        bytes.zeroize();
        result
    }

    fn save(&mut self, credential: &Credential) -> Result<(), StoreError> {
        let write_error = |e: io::Error| StoreError::WriteError(e.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut bytes = credential.to_bytes();
        fs::write(&self.path, &bytes).map_err(write_error)?;

        // Read back to catch silent write failures
        let mut read_back = fs::read(&self.path).map_err(write_error)?;
        let matches = read_back == bytes;
        bytes.zeroize();
        read_back.zeroize();
        if !matches {
            return Err(StoreError::WriteError(
                "verification failed: data mismatch after save".into(),
            ));
        }

        info!("Credential for '{}' saved to {:?}", credential.ssid, self.path);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Credential file {:?} removed", self.path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::WriteError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir()
            .join(format!("librarian-cred-{}-{}", pid, id))
            .join("wifi.cred")
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let store = FileCredentialStore::new(unique_path());
        assert_eq!(store.load(), Err(StoreError::NotFound));
    }

    #[test]
    fn test_save_then_load() {
        let path = unique_path();
        let mut store = FileCredentialStore::new(&path);
        let credential = Credential::new("Attic", "bookworms!").unwrap();

        store.save(&credential).unwrap();
        assert_eq!(store.load().unwrap(), credential);

        // A fresh instance sees the same record
        assert_eq!(FileCredentialStore::new(&path).load().unwrap(), credential);

        store.clear().unwrap();
        assert_eq!(store.load(), Err(StoreError::NotFound));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_clear_empty_store_is_ok() {
        let mut store = FileCredentialStore::new(unique_path());
        assert!(store.clear().is_ok());
    }

    #[test]
    fn test_corrupt_file() {
        let path = unique_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [9, b'x']).unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_unwritable_location() {
        // The parent "directory" is a regular file, so creating it fails
        let blocker = unique_path();
        fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        fs::write(&blocker, b"not a directory").unwrap();

        let mut store = FileCredentialStore::new(blocker.join("wifi.cred"));
        let result = store.save(&Credential::open("Net").unwrap());
        assert!(matches!(result, Err(StoreError::WriteError(_))));
        let _ = fs::remove_dir_all(blocker.parent().unwrap());
    }
}
