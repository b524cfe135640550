//! Reference-counted directory access scopes.
//!
//! A user-granted directory must be "entered" before its files are touched
//! and "left" afterwards. Several operations can share one directory at the
//! same time, so entering is counted per directory: access begins on the
//! first acquisition and ends when the last guard is dropped.

use crate::error::{Result, SignatureError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Shared table of active directory scopes.
///
/// Cheap to clone; clones share the same counts.
#[derive(Debug, Clone, Default)]
pub struct AccessScopes {
    active: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl AccessScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or join) access to `directory`.
    ///
    /// The first acquisition verifies the directory is readable; if it isn't,
    /// no count is recorded and the error is returned.
    pub fn acquire(&self, directory: &Path) -> Result<AccessGuard> {
        let mut active = self.active.lock().map_err(|e| {
            SignatureError::Other(format!("Access scope table poisoned: {}", e))
        })?;

        match active.get_mut(directory) {
            Some(count) => {
                *count += 1;
                trace!("Joined access to {} (count {})", directory.display(), count);
            }
            None => {
                begin_access(directory)?;
                active.insert(directory.to_path_buf(), 1);
                debug!("Began access to {}", directory.display());
            }
        }

        Ok(AccessGuard {
            scopes: self.clone(),
            directory: directory.to_path_buf(),
            released: false,
        })
    }

    /// Number of live guards for `directory`.
    pub fn active_count(&self, directory: &Path) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(directory)
            .copied()
            .unwrap_or(0)
    }

    /// Whether `directory` is currently entered.
    pub fn is_active(&self, directory: &Path) -> bool {
        self.active_count(directory) > 0
    }

    fn release(&self, directory: &Path) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = match active.get_mut(directory) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return,
        };
        if remaining == 0 {
            active.remove(directory);
            debug!("Ended access to {}", directory.display());
        } else {
            trace!(
                "Left access to {} (count {})",
                directory.display(),
                remaining
            );
        }
    }
}

/// Holds one count on a directory scope. Dropping it releases the count.
#[derive(Debug)]
pub struct AccessGuard {
    scopes: AccessScopes,
    directory: PathBuf,
    released: bool,
}

impl AccessGuard {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.scopes.release(&self.directory);
        }
    }
}

impl Drop for AccessGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

fn begin_access(directory: &Path) -> Result<()> {
    match std::fs::read_dir(directory) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SignatureError::DirectoryNotFound {
            path: Some(directory.to_path_buf()),
        }),
        Err(e) => Err(SignatureError::io_with_path(e, directory)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_nested_acquisitions_keep_scope_active() {
        let tmp = TempDir::new().unwrap();
        let scopes = AccessScopes::new();

        let outer = scopes.acquire(tmp.path()).unwrap();
        {
            let _inner = scopes.acquire(tmp.path()).unwrap();
            assert_eq!(scopes.active_count(tmp.path()), 2);
        }
        assert!(scopes.is_active(tmp.path()));

        outer.release();
        assert!(!scopes.is_active(tmp.path()));
    }

    #[test]
    fn test_release_on_error_path() {
        fn failing_operation(scopes: &AccessScopes, dir: &Path) -> Result<()> {
            let _guard = scopes.acquire(dir)?;
            Err(SignatureError::Other("boom".into()))
        }

        let tmp = TempDir::new().unwrap();
        let scopes = AccessScopes::new();
        assert!(failing_operation(&scopes, tmp.path()).is_err());
        assert_eq!(scopes.active_count(tmp.path()), 0);
    }

    #[test]
    fn test_missing_directory_records_nothing() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("gone");
        let scopes = AccessScopes::new();

        let err = scopes.acquire(&missing).unwrap_err();
        assert!(matches!(err, SignatureError::DirectoryNotFound { .. }));
        assert_eq!(scopes.active_count(&missing), 0);
    }

    #[test]
    fn test_concurrent_acquisitions() {
        let tmp = TempDir::new().unwrap();
        let scopes = AccessScopes::new();
        let dir = tmp.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scopes = scopes.clone();
                let dir = dir.clone();
                std::thread::spawn(move || {
                    let _guard = scopes.acquire(&dir).unwrap();
                    assert!(scopes.is_active(&dir));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(scopes.active_count(&dir), 0);
    }
}
