//! Finding the signatures directory.
//!
//! The locator never prompts. When it can't find a directory it returns a
//! typed error and the caller decides whether to show a directory chooser,
//! whose result comes back through [`DirectoryLocator::grant`].

use crate::access::BookmarkStore;
use crate::config::MailPathsConfig;
use crate::error::{Result, SignatureError};
use crate::format::{self, SignatureFormat};
use crate::platform;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of the external directory chooser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryChoice {
    Selected(PathBuf),
    Cancelled,
}

/// How a directory was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorySource {
    /// Resolved from a persisted user grant
    Grant,
    /// The mail client's well-known location
    DefaultPath,
    /// Supplied directly by the caller
    Explicit,
}

/// A located signatures directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureDirectory {
    pub path: PathBuf,
    pub source: DirectorySource,
}

impl SignatureDirectory {
    /// Whether file operations must hold an access scope on this directory.
    pub fn requires_scope(&self) -> bool {
        self.source == DirectorySource::Grant
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MailPathsConfig::MANIFEST_FILENAME)
    }
}

/// Locates the signatures directory from a grant or the default path.
#[derive(Clone)]
pub struct DirectoryLocator {
    bookmarks: BookmarkStore,
    default_path: Option<PathBuf>,
}

impl DirectoryLocator {
    /// Locator probing the platform's default location.
    pub fn new(bookmarks: BookmarkStore) -> Self {
        let default_path = match platform::default_signatures_dir() {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("No default signatures directory: {}", e);
                None
            }
        };
        Self {
            bookmarks,
            default_path,
        }
    }

    /// Replace the default location (`None` disables the default check).
    pub fn with_default_path(mut self, path: Option<PathBuf>) -> Self {
        self.default_path = path;
        self
    }

    pub fn bookmarks(&self) -> &BookmarkStore {
        &self.bookmarks
    }

    pub fn default_path(&self) -> Option<&Path> {
        self.default_path.as_deref()
    }

    /// Find the signatures directory.
    ///
    /// Order: persisted grant, then the default path. A stale grant fails
    /// with [`SignatureError::BookmarkStale`] instead of falling through.
    pub fn locate(&self) -> Result<SignatureDirectory> {
        if let Some(grant) = self.bookmarks.resolve()? {
            if grant.is_stale {
                return Err(SignatureError::BookmarkStale {
                    path: Some(grant.directory),
                });
            }
            info!("Using granted directory {}", grant.directory.display());
            return Ok(SignatureDirectory {
                path: grant.directory,
                source: DirectorySource::Grant,
            });
        }

        if let Some(path) = self.check_default()? {
            info!("Using default directory {}", path.display());
            return Ok(SignatureDirectory {
                path,
                source: DirectorySource::DefaultPath,
            });
        }

        debug!(
            "No signatures directory found (platform {}, mail client available: {})",
            platform::current_platform(),
            platform::hosts_mail_client()
        );
        Err(SignatureError::DirectoryNotFound {
            path: self.default_path.clone(),
        })
    }

    /// Check the default location.
    ///
    /// Accepted only if it is a readable directory holding the catalog or a
    /// payload file. An unreadable directory is `PermissionDenied`.
    fn check_default(&self) -> Result<Option<PathBuf>> {
        let Some(path) = &self.default_path else {
            return Ok(None);
        };
        if !path.is_dir() {
            return Ok(None);
        }

        let entries = std::fs::read_dir(path).map_err(|e| SignatureError::io_with_path(e, path))?;
        let recognized = entries.filter_map(|e| e.ok()).any(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name == MailPathsConfig::MANIFEST_FILENAME
                || Path::new(name.as_ref())
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(SignatureFormat::from_extension)
                    .is_some()
        });

        if recognized {
            Ok(Some(path.clone()))
        } else {
            debug!("Default directory {} has no signatures", path.display());
            Ok(None)
        }
    }

    /// Accept the directory chooser's result and persist a grant for it.
    pub fn grant(&self, choice: DirectoryChoice) -> Result<SignatureDirectory> {
        let path = match choice {
            DirectoryChoice::Selected(path) => path,
            DirectoryChoice::Cancelled => {
                info!("Directory selection cancelled");
                return Err(SignatureError::DirectoryNotFound { path: None });
            }
        };
        if !path.is_dir() {
            return Err(SignatureError::DirectoryNotFound { path: Some(path) });
        }

        let candidates = format::candidate_files(&path)?;
        let count = |format: SignatureFormat| {
            candidates
                .iter()
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .and_then(SignatureFormat::from_extension)
                        == Some(format)
                })
                .count()
        };
        info!(
            "Selected {}: {} candidate files ({} {}, {} {}), catalog present: {}",
            path.display(),
            candidates.len(),
            count(SignatureFormat::RawHtml),
            MailPathsConfig::RAW_EXTENSION,
            count(SignatureFormat::WebArchive),
            MailPathsConfig::ARCHIVE_EXTENSION,
            path.join(MailPathsConfig::MANIFEST_FILENAME).is_file()
        );

        let grant = self.bookmarks.persist(&path)?;
        Ok(SignatureDirectory {
            path: grant.directory,
            source: DirectorySource::Grant,
        })
    }

    /// Drop the persisted grant.
    pub fn revoke(&self) -> Result<()> {
        self.bookmarks.forget()
    }
}
