//! Writing signatures back to disk.
//!
//! Each write runs inside the directory's access scope, unlocks the target,
//! atomically replaces it, and locks it again so the mail client doesn't
//! overwrite the edit when it next syncs. Failing to re-lock is logged and
//! otherwise ignored.

use crate::atomic::atomic_write_bytes;
use crate::codec;
use crate::config::MailPathsConfig;
use crate::error::{Result, SignatureError};
use crate::format::SignatureFormat;
use crate::manifest;
use crate::platform::ProtectionPolicy;
use crate::session::Session;
use crate::signature::Signature;
use crate::webarchive::WebArchive;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a write did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub path: PathBuf,
    pub bytes_written: usize,
    /// The protection attribute is set on the file
    pub protected: bool,
    /// The HTML regenerated from rich content differed from canonical HTML
    pub html_diverged: bool,
    /// Catalog entries that took a new display name
    pub catalog_entries_renamed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceWriter {
    policy: ProtectionPolicy,
}

impl PersistenceWriter {
    pub fn new(policy: ProtectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ProtectionPolicy {
        self.policy
    }

    /// Write `signature` to its storage path.
    pub fn write(&self, session: &Session, signature: &Signature) -> Result<WriteReport> {
        let regenerated = codec::rich_to_html(signature.rich_content());
        let reconciled = codec::reconcile(&regenerated, Some(signature.canonical_html()));

        self.write_html(
            session,
            signature.storage_path(),
            signature.format(),
            &reconciled.html,
            reconciled.diverged,
        )
    }

    /// Write `html` to `path` in `format`.
    pub fn write_html(
        &self,
        session: &Session,
        path: &Path,
        format: SignatureFormat,
        html: &str,
        html_diverged: bool,
    ) -> Result<WriteReport> {
        let _scope = session.enter()?;

        let (bytes_written, _) = self.replace_protected(path, || {
            let bytes = serialize(format, html)?;
            atomic_write_bytes(path, &bytes)
        })?;

        let protected = match self.policy.apply(path) {
            Ok(()) => self.policy.supports_attribute(),
            Err(e) => {
                warn!(
                    "{} (the mail client may overwrite this signature)",
                    e
                );
                false
            }
        };

        info!(
            "Wrote {} ({} bytes, {}, protected: {})",
            path.display(),
            bytes_written,
            format,
            protected
        );
        Ok(WriteReport {
            path: path.to_path_buf(),
            bytes_written,
            protected,
            html_diverged,
            catalog_entries_renamed: 0,
        })
    }

    /// Give every catalog entry for `signature_id` the name `name`.
    ///
    /// The session's catalog is unlocked for the rewrite and locked
    /// again afterwards if it was locked before.
    pub fn rename_in_catalog(
        &self,
        session: &Session,
        signature_id: &str,
        name: &str,
    ) -> Result<usize> {
        let _scope = session.enter()?;
        let path = session.root().join(MailPathsConfig::MANIFEST_FILENAME);
        if !path.is_file() {
            return Ok(0);
        }

        let (renamed, was_protected) = self.replace_protected(&path, || {
            manifest::rename_entries(&path, signature_id, name)
        })?;
        if was_protected {
            if let Err(e) = self.policy.apply(&path) {
                warn!("{}", e);
            }
        }
        if renamed > 0 {
            info!(
                "Renamed {} to '{}' in {}",
                signature_id,
                name,
                path.display()
            );
        }
        Ok(renamed)
    }

    /// Run `replace` with protection lifted from `path`, returning its value
    /// and whether the file was protected beforehand.
    ///
    /// On failure the file is locked again when it was locked before, so a
    /// failed write never leaves the old content open to the mail client.
    fn replace_protected<T>(
        &self,
        path: &Path,
        replace: impl FnOnce() -> Result<T>,
    ) -> Result<(T, bool)> {
        let was_protected = match self.policy.clear(path) {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!("{}", e);
                false
            }
        };

        match replace() {
            Ok(value) => Ok((value, was_protected)),
            Err(e) => {
                if was_protected {
                    if let Err(restore) = self.policy.apply(path) {
                        warn!("Failed to restore protection on {}: {}", path.display(), restore);
                    }
                }
                Err(e)
            }
        }
    }

    /// Unlock and delete `path`. Returns `false` if the file was already gone.
    pub fn remove(&self, session: &Session, path: &Path) -> Result<bool> {
        let _scope = session.enter()?;

        if let Err(e) = self.policy.clear(path) {
            warn!("{}", e);
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} was already gone", path.display());
                Ok(false)
            }
            Err(e) => Err(SignatureError::io_with_path(e, path)),
        }
    }
}

/// Payload bytes for `html` in `format`.
pub fn serialize(format: SignatureFormat, html: &str) -> Result<Vec<u8>> {
    match format {
        SignatureFormat::RawHtml => Ok(html.as_bytes().to_vec()),
        SignatureFormat::WebArchive => WebArchive::for_html(html).to_bytes(),
    }
}
