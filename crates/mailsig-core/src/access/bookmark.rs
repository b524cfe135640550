//! Persisted access tokens for a user-granted directory.
//!
//! A token records where the directory was and which filesystem object it
//! was at grant time. Resolving a token checks that the same object is still
//! there; if it was deleted, replaced, or turned into a file, the grant is
//! stale and the user has to choose the directory again.

use super::scope::{AccessGuard, AccessScopes};
use super::state::AppStateStore;
use crate::config::AppStateConfig;
use crate::error::{Result, SignatureError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A resolved directory grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// Opaque token as persisted.
    pub token: String,
    /// Directory the token points at.
    pub directory: PathBuf,
    /// The directory is gone or is no longer the object that was granted.
    pub is_stale: bool,
}

/// Decoded token contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct BookmarkPayload {
    path: PathBuf,
    #[serde(default)]
    device: Option<u64>,
    #[serde(default)]
    inode: Option<u64>,
    created_at: DateTime<Utc>,
}

impl BookmarkPayload {
    fn capture(directory: &Path) -> Result<Self> {
        let metadata =
            std::fs::metadata(directory).map_err(|e| SignatureError::io_with_path(e, directory))?;
        if !metadata.is_dir() {
            return Err(SignatureError::DirectoryNotFound {
                path: Some(directory.to_path_buf()),
            });
        }
        let (device, inode) = file_identity(&metadata);
        Ok(Self {
            path: directory.to_path_buf(),
            device,
            inode,
            created_at: Utc::now(),
        })
    }

    fn encode(&self) -> Result<String> {
        Ok(hex::encode(serde_json::to_vec(self)?))
    }

    fn decode(token: &str) -> Option<Self> {
        let bytes = hex::decode(token.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn is_stale(&self) -> bool {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(_) => return true,
        };
        if !metadata.is_dir() {
            return true;
        }
        match (self.device, self.inode, file_identity(&metadata)) {
            (Some(dev), Some(ino), (Some(now_dev), Some(now_ino))) => {
                dev != now_dev || ino != now_ino
            }
            _ => false,
        }
    }
}

#[cfg(unix)]
fn file_identity(metadata: &std::fs::Metadata) -> (Option<u64>, Option<u64>) {
    use std::os::unix::fs::MetadataExt;
    (Some(metadata.dev()), Some(metadata.ino()))
}

#[cfg(not(unix))]
fn file_identity(_metadata: &std::fs::Metadata) -> (Option<u64>, Option<u64>) {
    (None, None)
}

/// Persists, resolves and scopes directory grants.
#[derive(Clone)]
pub struct BookmarkStore {
    state: Arc<AppStateStore>,
    scopes: AccessScopes,
}

impl BookmarkStore {
    pub fn new(state: Arc<AppStateStore>) -> Self {
        Self {
            state,
            scopes: AccessScopes::new(),
        }
    }

    /// The application state backing this store.
    pub fn state(&self) -> &AppStateStore {
        &self.state
    }

    /// The shared scope table.
    pub fn scopes(&self) -> &AccessScopes {
        &self.scopes
    }

    /// Record a grant for `directory`, replacing any previous one.
    pub fn persist(&self, directory: &Path) -> Result<AccessGrant> {
        let payload = BookmarkPayload::capture(directory)?;
        let token = payload.encode()?;
        self.state
            .set_bookmark(AppStateConfig::BOOKMARK_KEY, &token)?;
        info!("Saved directory grant for {}", directory.display());
        Ok(AccessGrant {
            token,
            directory: payload.path,
            is_stale: false,
        })
    }

    /// Resolve the persisted grant.
    ///
    /// Returns `Ok(None)` if no grant was ever saved. A token that can't be
    /// decoded is reported as [`SignatureError::BookmarkStale`].
    pub fn resolve(&self) -> Result<Option<AccessGrant>> {
        let token = match self.state.bookmark(AppStateConfig::BOOKMARK_KEY) {
            Some(token) => token,
            None => return Ok(None),
        };

        let payload = BookmarkPayload::decode(&token).ok_or_else(|| {
            warn!("Saved directory grant could not be decoded");
            SignatureError::BookmarkStale { path: None }
        })?;

        let is_stale = payload.is_stale();
        if is_stale {
            warn!("Directory grant for {} is stale", payload.path.display());
        } else {
            debug!(
                "Resolved directory grant for {} (granted {})",
                payload.path.display(),
                payload.created_at
            );
        }

        Ok(Some(AccessGrant {
            token,
            directory: payload.path,
            is_stale,
        }))
    }

    /// Drop the persisted grant.
    pub fn forget(&self) -> Result<()> {
        self.state.remove_bookmark(AppStateConfig::BOOKMARK_KEY)?;
        info!("Removed directory grant");
        Ok(())
    }

    /// Begin scoped access to `directory`. Access ends when the guard drops.
    pub fn acquire(&self, directory: &Path) -> Result<AccessGuard> {
        self.scopes.acquire(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> BookmarkStore {
        BookmarkStore::new(Arc::new(AppStateStore::new(tmp.path().join("state.json"))))
    }

    #[test]
    fn test_resolve_without_grant() {
        let tmp = TempDir::new().unwrap();
        assert!(store(&tmp).resolve().unwrap().is_none());
    }

    #[test]
    fn test_persist_then_resolve() {
        let tmp = TempDir::new().unwrap();
        let sigs = tmp.path().join("Signatures");
        std::fs::create_dir(&sigs).unwrap();

        let bookmarks = store(&tmp);
        let saved = bookmarks.persist(&sigs).unwrap();
        let resolved = bookmarks.resolve().unwrap().unwrap();

        assert_eq!(resolved.directory, sigs);
        assert_eq!(resolved.token, saved.token);
        assert!(!resolved.is_stale);
    }

    #[test]
    fn test_removed_directory_is_stale() {
        let tmp = TempDir::new().unwrap();
        let sigs = tmp.path().join("Signatures");
        std::fs::create_dir(&sigs).unwrap();

        let bookmarks = store(&tmp);
        bookmarks.persist(&sigs).unwrap();
        std::fs::remove_dir(&sigs).unwrap();

        assert!(bookmarks.resolve().unwrap().unwrap().is_stale);
    }

    #[cfg(unix)]
    #[test]
    fn test_replaced_directory_is_stale() {
        let tmp = TempDir::new().unwrap();
        let sigs = tmp.path().join("Signatures");
        let other = tmp.path().join("Other");
        std::fs::create_dir(&sigs).unwrap();
        std::fs::create_dir(&other).unwrap();

        let bookmarks = store(&tmp);
        bookmarks.persist(&sigs).unwrap();

        std::fs::remove_dir(&sigs).unwrap();
        std::fs::rename(&other, &sigs).unwrap();

        assert!(bookmarks.resolve().unwrap().unwrap().is_stale);
    }

    #[test]
    fn test_garbage_token_is_stale_error() {
        let tmp = TempDir::new().unwrap();
        let bookmarks = store(&tmp);
        bookmarks
            .state()
            .set_bookmark(AppStateConfig::BOOKMARK_KEY, "zz-not-hex")
            .unwrap();

        let err = bookmarks.resolve().unwrap_err();
        assert!(matches!(err, SignatureError::BookmarkStale { .. }));
    }

    #[test]
    fn test_forget() {
        let tmp = TempDir::new().unwrap();
        let sigs = tmp.path().join("Signatures");
        std::fs::create_dir(&sigs).unwrap();

        let bookmarks = store(&tmp);
        bookmarks.persist(&sigs).unwrap();
        bookmarks.forget().unwrap();
        assert!(bookmarks.resolve().unwrap().is_none());
    }

    #[test]
    fn test_persist_rejects_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = store(&tmp).persist(&file).unwrap_err();
        assert!(matches!(err, SignatureError::DirectoryNotFound { .. }));
    }
}
