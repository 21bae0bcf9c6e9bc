//! Pending credential fields written over BLE.
//!
//! SSID and secret arrive as separate characteristic writes; a commit write
//! then submits them together. This type holds the fields between writes and
//! tracks the status reported back to the client.

use super::wifi::{CommitCommand, ConfigError, ProvisionStatus, MAX_SECRET_LEN, MAX_SSID_LEN};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use zeroize::Zeroize;

#[derive(Debug)]
struct Fields {
    ssid: String,
    secret: String,
    status: ProvisionStatus,
}

impl Drop for Fields {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Shared pending fields and status.
#[derive(Debug, Clone)]
pub struct PendingCredential {
    fields: Arc<Mutex<Fields>>,
}

impl Default for PendingCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCredential {
    pub fn new() -> Self {
        Self {
            fields: Arc::new(Mutex::new(Fields {
                ssid: String::new(),
                secret: String::new(),
                status: ProvisionStatus::ConfigMode,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Fields> {
        self.fields.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a raw SSID write. Oversized or non-UTF-8 data is rejected
    /// before allocating.
    pub fn set_ssid(&self, data: &[u8]) -> Result<(), ConfigError> {
        if data.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: data.len(),
                max: MAX_SSID_LEN,
            });
        }
        let ssid = std::str::from_utf8(data)
            .map_err(|_| ConfigError::InvalidFormat("SSID is not UTF-8".into()))?;
        self.lock().ssid = ssid.to_string();
        Ok(())
    }

    /// Store a raw secret write.
    pub fn set_secret(&self, data: &[u8]) -> Result<(), ConfigError> {
        if data.len() > MAX_SECRET_LEN {
            return Err(ConfigError::SecretTooLong {
                len: data.len(),
                max: MAX_SECRET_LEN,
            });
        }
        let secret = std::str::from_utf8(data)
            .map_err(|_| ConfigError::InvalidFormat("secret is not UTF-8".into()))?;
        let mut fields = self.lock();
        fields.secret.zeroize();
        fields.secret = secret.to_string();
        Ok(())
    }

    pub fn ssid(&self) -> String {
        self.lock().ssid.clone()
    }

    pub fn status(&self) -> ProvisionStatus {
        self.lock().status.clone()
    }

    /// Handle a raw commit write.
    ///
    /// `save` hands the pending fields to `submit`; `clear` wipes them.
    /// Returns the new status for notification.
    pub fn commit<F, E>(&self, data: &[u8], submit: F) -> ProvisionStatus
    where
        F: FnOnce(&str, &str) -> Result<(), E>,
        E: fmt::Display,
    {
        let command = std::str::from_utf8(data)
            .map_err(|_| ConfigError::InvalidFormat("command is not UTF-8".into()))
            .and_then(|s| s.parse::<CommitCommand>());

        let mut fields = self.lock();
        let status = match command {
            Ok(CommitCommand::Save) => match submit(&fields.ssid, &fields.secret) {
                Ok(()) => {
                    fields.secret.zeroize();
                    fields.ssid.clear();
                    ProvisionStatus::Saved
                }
                Err(e) => ProvisionStatus::Failed {
                    reason: e.to_string(),
                },
            },
            Ok(CommitCommand::Clear) => {
                fields.secret.zeroize();
                fields.ssid.clear();
                ProvisionStatus::ConfigMode
            }
            Err(e) => ProvisionStatus::Failed {
                reason: e.to_string(),
            },
        };

        fields.status = status.clone();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_save_submits_pending_fields() {
        let pending = PendingCredential::new();
        pending.set_ssid(b"Attic").unwrap();
        pending.set_secret(b"bookworms!").unwrap();

        let seen = RefCell::new(None);
        let status = pending.commit(b"save", |ssid, secret| {
            *seen.borrow_mut() = Some((ssid.to_string(), secret.to_string()));
            Ok::<(), String>(())
        });

        assert_eq!(status, ProvisionStatus::Saved);
        assert_eq!(
            seen.into_inner(),
            Some(("Attic".to_string(), "bookworms!".to_string()))
        );
        // Fields are wiped after a successful save
        assert_eq!(pending.ssid(), "");
        assert_eq!(pending.status(), ProvisionStatus::Saved);
    }

    #[test]
    fn test_failed_submit_reports_reason_and_keeps_fields() {
        let pending = PendingCredential::new();
        pending.set_ssid(b"Attic").unwrap();

        let status = pending.commit(b"save", |_, _| Err("storage full"));

        assert_eq!(
            status,
            ProvisionStatus::Failed {
                reason: "storage full".to_string()
            }
        );
        assert_eq!(pending.ssid(), "Attic");
    }

    #[test]
    fn test_clear_discards_fields() {
        let pending = PendingCredential::new();
        pending.set_ssid(b"Attic").unwrap();
        pending.set_secret(b"bookworms!").unwrap();

        let status = pending.commit(b"clear", |_, _| -> Result<(), String> {
            panic!("clear must not submit")
        });

        assert_eq!(status, ProvisionStatus::ConfigMode);
        assert_eq!(pending.ssid(), "");
    }

    #[test]
    fn test_unknown_command() {
        let pending = PendingCredential::new();
        let status = pending.commit(b"reboot", |_, _| Ok::<(), String>(()));
        assert!(matches!(status, ProvisionStatus::Failed { .. }));
    }

    #[test]
    fn test_oversized_writes_rejected() {
        let pending = PendingCredential::new();
        assert!(pending.set_ssid(&[b'a'; 33]).is_err());
        assert!(pending.set_secret(&[b'a'; 65]).is_err());
        assert!(pending.set_ssid(&[0xff, 0xfe]).is_err());
    }
}
