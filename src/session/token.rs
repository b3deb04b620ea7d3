//! Bearer token persistence.
//!
//! Credentials live in `<state>/session.json` with an absolute expiry. An
//! expired entry is treated exactly like an absent one and removed on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::Role;
use crate::persist::{self, Loaded, StoreError};

pub const SESSION_FILE: &str = "session.json";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub token: String,
    pub role: Option<Role>,
    pub fhir_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl StoredCredentials {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .field("fhir_id", &self.fhir_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub struct TokenStore {
    path: Option<PathBuf>,
    current: Mutex<Option<StoredCredentials>>,
}

impl TokenStore {
    /// Open the token file under `state_dir`, dropping it if expired or unreadable.
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        let path = state_dir.join(SESSION_FILE);
        let current = match persist::read_json::<StoredCredentials>(&path)? {
            Loaded::Value(creds) if !creds.is_expired_at(Utc::now()) => Some(creds),
            Loaded::Value(_) => {
                debug!("Stored session expired, discarding");
                persist::remove(&path)?;
                None
            }
            Loaded::Corrupt(e) => {
                warn!(error = %e, "Ignoring unreadable session file");
                persist::remove(&path)?;
                None
            }
            Loaded::Missing => None,
        };

        Ok(Self {
            path: Some(path),
            current: Mutex::new(current),
        })
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: Mutex::new(None),
        }
    }

    /// Live credentials, if any
    pub fn get(&self) -> Option<StoredCredentials> {
        let mut current = self.lock();
        match current.as_ref() {
            Some(creds) if creds.is_expired_at(Utc::now()) => {
                debug!("Session token expired");
                *current = None;
                drop(current);
                if let Err(e) = self.remove_file() {
                    warn!(error = %e, "Failed to remove expired session file");
                }
                None
            }
            other => other.cloned(),
        }
    }

    pub fn bearer(&self) -> Option<String> {
        self.get().map(|c| c.token)
    }

    /// Replace the credentials. The in-memory copy is updated even if the
    /// file write fails.
    pub fn store(&self, creds: StoredCredentials) -> Result<(), StoreError> {
        *self.lock() = Some(creds.clone());
        match &self.path {
            Some(path) => persist::write_json(path, &creds),
            None => Ok(()),
        }
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        *self.lock() = None;
        self.remove_file()
    }

    fn remove_file(&self) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => persist::remove(path),
            None => Ok(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StoredCredentials>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn creds(expires_in: Duration) -> StoredCredentials {
        StoredCredentials {
            token: "tok".to_string(),
            role: Some(Role::Patient),
            fhir_id: Some("123".to_string()),
            expires_at: Utc::now() + expires_in,
        }
    }

    #[test]
    fn test_store_persists_across_open() {
        let temp_dir = TempDir::new().unwrap();
        let store = TokenStore::open(temp_dir.path()).unwrap();
        store.store(creds(Duration::hours(1))).unwrap();

        let reopened = TokenStore::open(temp_dir.path()).unwrap();
        let loaded = reopened.get().unwrap();
        assert_eq!(loaded.token, "tok");
        assert_eq!(loaded.role, Some(Role::Patient));
        assert_eq!(reopened.bearer().as_deref(), Some("tok"));
    }

    #[test]
    fn test_expired_file_is_discarded_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SESSION_FILE);
        persist::write_json(&path, &creds(Duration::seconds(-5))).unwrap();

        let store = TokenStore::open(temp_dir.path()).unwrap();
        assert!(store.get().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_expiry_while_running_drops_token() {
        let store = TokenStore::in_memory();
        store.store(creds(Duration::seconds(-1))).unwrap();
        assert!(store.bearer().is_none());
    }

    #[test]
    fn test_corrupt_session_file_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(SESSION_FILE), "garbage").unwrap();
        let store = TokenStore::open(temp_dir.path()).unwrap();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_clear_removes_file_and_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = TokenStore::open(temp_dir.path()).unwrap();
        store.store(creds(Duration::hours(1))).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.get().is_none());
        assert!(!temp_dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_debug_hides_token() {
        let debug = format!("{:?}", creds(Duration::hours(1)));
        assert!(!debug.contains("tok\""));
        assert!(debug.contains("<redacted>"));
    }
}
