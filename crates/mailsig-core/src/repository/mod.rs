//! The signature repository: list, create, update and save, delete.
//!
//! Records live in memory behind an async lock; all file work runs on the
//! blocking pool. Operations on one payload file are serialized, operations
//! on different files are independent and may fail independently.

mod builder;

pub use builder::RepositoryBuilder;

use crate::config::MailPathsConfig;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::error::{Result, SignatureError};
use crate::format::{self, FileClass, SignatureFormat};
use crate::locks::PathLocks;
use crate::manifest::{self, ManifestReport};
use crate::parser;
use crate::session::Session;
use crate::signature::{Signature, SignatureContent};
use crate::writer::{PersistenceWriter, WriteReport};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Signatures found by [`SignatureRepository::list`] and what was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct ListOutcome {
    pub signatures: Vec<Signature>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Access point for the UI layer.
///
/// Cheap to clone; clones share records.
#[derive(Clone)]
pub struct SignatureRepository {
    inner: Arc<RepositoryInner>,
}

struct RepositoryInner {
    session: Session,
    writer: PersistenceWriter,
    default_name: String,
    records: RwLock<Vec<Signature>>,
    diagnostics: RwLock<Vec<Diagnostic>>,
    path_locks: PathLocks,
}

impl SignatureRepository {
    pub fn builder(session: Session) -> RepositoryBuilder {
        RepositoryBuilder::new(session)
    }

    /// Repository with default options.
    pub fn new(session: Session) -> Result<Self> {
        Self::builder(session).build()
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Load every signature in the directory.
    ///
    /// Only directory-level problems fail; bad files and catalog entries
    /// end up in the diagnostics. Records with unsaved changes are kept in
    /// place of their on-disk version.
    pub async fn list(&self) -> Result<ListOutcome> {
        let session = self.inner.session.clone();
        let (loaded, diagnostics) =
            tokio::task::spawn_blocking(move || load_directory(&session)).await??;

        let mut records = self.inner.records.write().await;
        let signatures: Vec<Signature> = loaded
            .into_iter()
            .map(|sig| {
                records
                    .iter()
                    .find(|r| r.is_dirty() && r.signature_id() == sig.signature_id())
                    .cloned()
                    .unwrap_or(sig)
            })
            .collect();
        *records = signatures.clone();
        drop(records);

        *self.inner.diagnostics.write().await = diagnostics.clone();

        info!(
            "Listed {} signatures ({} diagnostics)",
            signatures.len(),
            diagnostics.len()
        );
        Ok(ListOutcome {
            signatures,
            diagnostics,
        })
    }

    /// Create a new signature in the directory's dominant format.
    ///
    /// The record becomes visible only after the file is written and read
    /// back. On failure any partial file is removed.
    pub async fn create(&self, name: &str, content: SignatureContent) -> Result<Signature> {
        let name = if name.trim().is_empty() {
            self.inner.default_name.clone()
        } else {
            name.trim().to_string()
        };
        let (rich, html) = content.into_views();

        let session = self.inner.session.clone();
        let writer = self.inner.writer.clone();
        let signature = tokio::task::spawn_blocking(move || {
            let _scope = session.enter()?;
            let detected = format::detect(session.root())?;
            let format = detected.format.for_new_signature();
            let signature_id = Uuid::new_v4().to_string().to_uppercase();
            let path = session.root().join(format.file_name(&signature_id));
            debug!(
                "Creating {} as {} (directory votes {:?})",
                signature_id, format, detected.counts
            );

            let draft = Signature::new(&signature_id, &path, format, &name, html, rich);
            let result = writer
                .write(&session, &draft)
                .and_then(|_| parser::parse(&path, None));
            match result {
                Ok(mut signature) => {
                    signature.set_display_name(name);
                    Ok(signature)
                }
                Err(e) => {
                    if let Err(cleanup) = writer.remove(&session, &path) {
                        warn!("Failed to remove partial file {}: {}", path.display(), cleanup);
                    }
                    Err(e)
                }
            }
        })
        .await??;

        self.inner.records.write().await.push(signature.clone());
        info!("Created signature {}", signature.signature_id());
        Ok(signature)
    }

    /// Replace a signature's content in memory. Nothing is written.
    pub async fn update(&self, signature_id: &str, content: SignatureContent) -> Result<Signature> {
        let (rich, html) = content.into_views();
        self.modify(signature_id, |sig| sig.set_content(rich, html))
            .await
    }

    /// Change a signature's display name in memory.
    ///
    /// The next [`save`](Self::save) writes the name into the catalog
    /// entries for the signature. A signature without catalog entries takes
    /// its name from its content, so the new name doesn't outlive the
    /// process; [`WriteReport::catalog_entries_renamed`] is zero then.
    pub async fn rename(&self, signature_id: &str, name: &str) -> Result<Signature> {
        let name = name.trim().to_string();
        self.modify(signature_id, |sig| {
            sig.set_display_name(name);
            sig.mark_renamed();
        })
        .await
    }

    async fn modify(
        &self,
        signature_id: &str,
        change: impl FnOnce(&mut Signature),
    ) -> Result<Signature> {
        let mut records = self.inner.records.write().await;
        let signature = records
            .iter_mut()
            .find(|r| r.signature_id() == signature_id)
            .ok_or_else(|| not_found(signature_id))?;
        change(signature);
        signature.mark_dirty();
        debug!("Updated {} in memory", signature_id);
        Ok(signature.clone())
    }

    /// Write the in-memory state of a signature to disk.
    ///
    /// The record is marked clean only if the write succeeds and nothing
    /// changed it while the write was running.
    pub async fn save(&self, signature_id: &str) -> Result<WriteReport> {
        let snapshot = self.require(signature_id).await?;
        let _lock = self.inner.path_locks.lock(snapshot.storage_path()).await;

        let session = self.inner.session.clone();
        let writer = self.inner.writer.clone();
        let to_write = snapshot.clone();
        let mut report =
            tokio::task::spawn_blocking(move || writer.write(&session, &to_write)).await??;

        if snapshot.is_renamed() {
            let manifest_path = self
                .inner
                .session
                .root()
                .join(MailPathsConfig::MANIFEST_FILENAME);
            let _catalog_lock = self.inner.path_locks.lock(&manifest_path).await;
            let session = self.inner.session.clone();
            let writer = self.inner.writer.clone();
            let id = signature_id.to_string();
            let name = snapshot.display_name().to_string();
            report.catalog_entries_renamed = tokio::task::spawn_blocking(move || {
                writer.rename_in_catalog(&session, &id, &name)
            })
            .await??;
            if report.catalog_entries_renamed == 0 {
                debug!("{} has no catalog entry, name kept in memory only", signature_id);
            }
        }

        let mut records = self.inner.records.write().await;
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.signature_id() == signature_id)
        {
            if *record == snapshot {
                record.mark_clean();
            } else {
                debug!("{} changed during save, leaving it dirty", signature_id);
            }
        }
        Ok(report)
    }

    /// Delete a signature's payload files and drop its record.
    ///
    /// Every payload carrying the identifier is removed, so a copy in the
    /// other format doesn't resurface on the next list. Files that are
    /// already gone are not an error.
    pub async fn delete(&self, signature_id: &str) -> Result<()> {
        let snapshot = self.require(signature_id).await?;
        let path = snapshot.storage_path().to_path_buf();
        let _lock = self.inner.path_locks.lock(&path).await;

        let session = self.inner.session.clone();
        let writer = self.inner.writer.clone();
        let id = signature_id.to_string();
        let removed = tokio::task::spawn_blocking(move || {
            let mut targets = vec![path];
            for format in SignatureFormat::lookup_order() {
                let sibling = session.root().join(format.file_name(&id));
                if !targets.contains(&sibling) {
                    targets.push(sibling);
                }
            }
            let mut removed = 0usize;
            for target in &targets {
                if writer.remove(&session, target)? {
                    removed += 1;
                }
            }
            Ok::<_, SignatureError>(removed)
        })
        .await??;

        self.inner
            .records
            .write()
            .await
            .retain(|r| r.signature_id() != signature_id);
        info!("Deleted signature {} ({} files removed)", signature_id, removed);
        Ok(())
    }

    /// Snapshot of one record.
    pub async fn get(&self, signature_id: &str) -> Option<Signature> {
        self.inner
            .records
            .read()
            .await
            .iter()
            .find(|r| r.signature_id() == signature_id)
            .cloned()
    }

    /// Snapshot of all records, in list order.
    pub async fn signatures(&self) -> Vec<Signature> {
        self.inner.records.read().await.clone()
    }

    /// Diagnostics from the last [`list`](Self::list).
    pub async fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.diagnostics.read().await.clone()
    }

    /// Parse and cross-reference the catalog without loading payloads.
    pub async fn analyze_manifest(&self) -> Result<ManifestReport> {
        let session = self.inner.session.clone();
        let report = tokio::task::spawn_blocking(move || {
            let _scope = session.enter()?;
            Ok::<_, SignatureError>(manifest::analyze(session.root()))
        })
        .await??;
        Ok(report)
    }

    async fn require(&self, signature_id: &str) -> Result<Signature> {
        self.get(signature_id)
            .await
            .ok_or_else(|| not_found(signature_id))
    }
}

fn not_found(signature_id: &str) -> SignatureError {
    SignatureError::SignatureNotFound {
        signature_id: signature_id.to_string(),
    }
}

/// Read the catalog, then scan for everything it didn't cover.
fn load_directory(session: &Session) -> Result<(Vec<Signature>, Vec<Diagnostic>)> {
    let _scope = session.enter()?;
    let root = session.root();
    if !root.is_dir() {
        return Err(SignatureError::DirectoryNotFound {
            path: Some(root.to_path_buf()),
        });
    }

    let mut signatures = Vec::new();
    let mut diagnostics = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let manifest_path = root.join(MailPathsConfig::MANIFEST_FILENAME);
    if manifest_path.is_file() {
        match manifest::parse(&manifest_path) {
            Ok(parsed) => {
                diagnostics.extend(parsed.diagnostics);
                let (resolved, unresolved) = manifest::resolve(&parsed.entries, root);
                diagnostics.extend(unresolved);

                for entry in resolved {
                    match parser::parse(&entry.payload_path, Some(&entry.entry)) {
                        Ok(signature) => {
                            seen.insert(signature.signature_id().to_string());
                            signatures.push(signature);
                        }
                        Err(e) => diagnostics.push(skipped(&entry.payload_path, &e)),
                    }
                }
            }
            Err(e) => {
                warn!("{}, falling back to a directory scan", e);
                diagnostics.push(
                    Diagnostic::new(DiagnosticKind::ManifestUnreadable, e.to_string())
                        .with_path(&manifest_path),
                );
            }
        }
    } else {
        debug!("No catalog in {}, scanning files", root.display());
    }

    for path in format::candidate_files(root)? {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if seen.contains(stem) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::FileSkipped,
                    "another payload with the same identifier was loaded first",
                )
                .with_signature(stem)
                .with_path(&path),
            );
            continue;
        }

        let classification = match format::classify_file(&path) {
            Ok(classification) => classification,
            Err(e) => {
                diagnostics.push(skipped(&path, &e));
                continue;
            }
        };
        if classification.class == FileClass::Unrecognized {
            diagnostics.push(
                Diagnostic::new(DiagnosticKind::FileSkipped, "not a signature payload")
                    .with_path(&path),
            );
            continue;
        }

        match parser::parse(&path, None) {
            Ok(signature) => {
                seen.insert(signature.signature_id().to_string());
                signatures.push(signature);
            }
            Err(e) => diagnostics.push(skipped(&path, &e)),
        }
    }

    Ok((signatures, diagnostics))
}

fn skipped(path: &std::path::Path, error: &SignatureError) -> Diagnostic {
    warn!("Skipping {}: {}", path.display(), error);
    let diagnostic = Diagnostic::new(DiagnosticKind::FileSkipped, error.to_string()).with_path(path);
    match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => diagnostic.with_signature(stem),
        None => diagnostic,
    }
}
