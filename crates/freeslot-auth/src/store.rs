//! Durable credential storage.
//!
//! The credential is stored as JSON at a configured path. Writes go to a
//! sibling temp file that is renamed over the old one, so a reader sees
//! either the previous credential or the new one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::credential::{Credential, StoredCredential};
use crate::error::StoreError;

/// File-backed credential store.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the credential file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `credential`, replacing any previous one.
    ///
    /// On failure the previously stored credential is left intact.
    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io("create directory", parent, e))?;
        }

        let content = serde_json::to_string_pretty(&StoredCredential::from(credential))?;
        let temp_path = self.path.with_extension("json.tmp");

        if let Err(e) = fs::write(&temp_path, content) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io("write", &temp_path, e));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))
                .map_err(|e| StoreError::io("set permissions on", &temp_path, e))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::io("rename", &self.path, e)
        })?;

        debug!("saved credential to {:?}", self.path);
        Ok(())
    }

    /// Returns the stored credential, or `None` if there is no usable one.
    ///
    /// An unreadable file is logged and treated as absent.
    pub fn load(&self) -> Option<Credential> {
        match self.load_checked() {
            Ok(credential) => credential,
            Err(e) => {
                warn!("ignoring stored credential: {}", e);
                None
            }
        }
    }

    /// Returns the stored credential, reporting why an existing file is unusable.
    pub fn load_checked(&self) -> Result<Option<Credential>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no credential file at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(StoreError::io("read", &self.path, e)),
        };

        let unreadable = |reason: String| StoreError::Unreadable {
            path: self.path.clone(),
            reason,
        };

        let stored: StoredCredential =
            serde_json::from_str(&content).map_err(|e| unreadable(e.to_string()))?;
        let credential = Credential::try_from(stored).map_err(unreadable)?;

        debug!("loaded credential from {:?}", self.path);
        Ok(Some(credential))
    }

    /// Removes the stored credential.
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("removed credential file {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io("remove", &self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn credential(token: &str, refresh: Option<&str>) -> Credential {
        Credential::new(
            token,
            refresh.map(String::from),
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        )
    }

    #[test]
    fn missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credential.json"));
        assert!(store.load().is_none());
        assert!(store.load_checked().unwrap().is_none());
    }

    #[test]
    fn save_then_load_returns_latest() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("credential.json"));

        store.save(&credential("first", Some("r1"))).unwrap();
        store.save(&credential("second", Some("r2"))).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, credential("second", Some("r2")));
        assert!(!dir.path().join("nested").join("credential.json.tmp").exists());
    }

    #[test]
    fn file_uses_documented_shape() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credential.json"));
        store.save(&credential("a", None)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["access_token"], "a");
        assert!(raw["refresh_token"].is_null());
        assert_eq!(raw["token_expiry_time"], 1_700_000_000);
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credential.json"));
        store.save(&credential("a", None)).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_degrades_to_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credential.json");
        fs::write(&path, "{ not json").unwrap();

        let store = CredentialStore::new(&path);
        assert!(store.load().is_none());
        assert!(matches!(
            store.load_checked(),
            Err(StoreError::Unreadable { .. })
        ));
    }

    #[test]
    fn incomplete_file_degrades_to_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credential.json");
        fs::write(&path, r#"{"access_token":"a","refresh_token":"r"}"#).unwrap();
        assert!(CredentialStore::new(&path).load().is_none());
    }

    #[test]
    fn failed_save_keeps_prior_credential() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credential.json");
        let store = CredentialStore::new(&path);
        store.save(&credential("kept", Some("r"))).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let err = store.save(&credential("lost", None)).unwrap_err();
        assert!(matches!(err, StoreError::Io { action: "write", .. }));

        assert_eq!(store.load().unwrap().access_token(), "kept");
    }

    #[test]
    fn clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credential.json"));
        store.save(&credential("a", None)).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn concurrent_saves_never_tear() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CredentialStore::new(dir.path().join("credential.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .save(&credential(&format!("token-{i}"), Some("r")))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.load_checked().unwrap().unwrap();
        assert!(loaded.access_token().starts_with("token-"));
    }
}
