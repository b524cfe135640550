//! Builder for configuring a [`SignatureRepository`].

use super::{RepositoryInner, SignatureRepository};
use crate::config::ParserConfig;
use crate::error::{Result, SignatureError};
use crate::locks::PathLocks;
use crate::platform::ProtectionPolicy;
use crate::session::Session;
use crate::writer::PersistenceWriter;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Builder for configuring a [`SignatureRepository`].
///
/// # Example
///
/// ```rust,ignore
/// use mailsig_core::{ProtectionPolicy, Session, SignatureRepository};
///
/// let repo = SignatureRepository::builder(Session::for_directory("./Signatures"))
///     .protection(ProtectionPolicy::ReadOnly)
///     .default_name("New signature")
///     .build()?;
/// ```
pub struct RepositoryBuilder {
    session: Session,
    protection: ProtectionPolicy,
    default_name: String,
}

impl RepositoryBuilder {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            protection: ProtectionPolicy::platform_default(),
            default_name: ParserConfig::DEFAULT_NAME.to_string(),
        }
    }

    /// How written files are locked against the mail client.
    ///
    /// Default: [`ProtectionPolicy::platform_default`]
    pub fn protection(mut self, policy: ProtectionPolicy) -> Self {
        self.protection = policy;
        self
    }

    /// Name given to signatures created with a blank name.
    ///
    /// Default: `"Untitled signature"`
    pub fn default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    /// Build the repository. The session's directory must exist.
    pub fn build(self) -> Result<SignatureRepository> {
        let root = self.session.root();
        if !root.is_dir() {
            return Err(SignatureError::DirectoryNotFound {
                path: Some(root.to_path_buf()),
            });
        }

        Ok(SignatureRepository {
            inner: Arc::new(RepositoryInner {
                session: self.session,
                writer: PersistenceWriter::new(self.protection),
                default_name: self.default_name,
                records: RwLock::new(Vec::new()),
                diagnostics: RwLock::new(Vec::new()),
                path_locks: PathLocks::new(),
            }),
        })
    }
}
