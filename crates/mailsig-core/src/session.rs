//! The directory a repository works in, and the access bookkeeping for it.

use crate::access::{AccessGuard, BookmarkStore};
use crate::error::Result;
use crate::locator::{DirectoryChoice, DirectoryLocator, DirectorySource, SignatureDirectory};
use std::path::{Path, PathBuf};

/// An open signatures directory.
///
/// Created once directory discovery has succeeded and handed to the
/// repository; there is no process-wide "current directory".
#[derive(Clone)]
pub struct Session {
    directory: SignatureDirectory,
    /// Present for located and granted directories
    bookmarks: Option<BookmarkStore>,
}

impl Session {
    /// Open the directory found by `locator`.
    pub fn locate(locator: &DirectoryLocator) -> Result<Self> {
        Ok(Self {
            directory: locator.locate()?,
            bookmarks: Some(locator.bookmarks().clone()),
        })
    }

    /// Open the directory the user just chose, persisting a grant for it.
    pub fn grant(locator: &DirectoryLocator, choice: DirectoryChoice) -> Result<Self> {
        Ok(Self {
            directory: locator.grant(choice)?,
            bookmarks: Some(locator.bookmarks().clone()),
        })
    }

    /// Open `path` directly, without a grant.
    pub fn for_directory(path: impl Into<PathBuf>) -> Self {
        Self {
            directory: SignatureDirectory {
                path: path.into(),
                source: DirectorySource::Explicit,
            },
            bookmarks: None,
        }
    }

    pub fn directory(&self) -> &SignatureDirectory {
        &self.directory
    }

    pub fn root(&self) -> &Path {
        &self.directory.path
    }

    pub fn bookmarks(&self) -> Option<&BookmarkStore> {
        self.bookmarks.as_ref()
    }

    /// Hold an access scope for the duration of a file operation.
    ///
    /// Returns `None` for directories that don't need one.
    pub fn enter(&self) -> Result<Option<AccessGuard>> {
        match &self.bookmarks {
            Some(bookmarks) if self.directory.requires_scope() => {
                bookmarks.acquire(&self.directory.path).map(Some)
            }
            _ => Ok(None),
        }
    }
}
