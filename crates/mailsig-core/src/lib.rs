//! Mailsig Core - Headless engine for mail client signatures.
//!
//! This crate finds the mail client's signatures directory, reads every
//! signature in it (catalog-listed or not, web archive or raw HTML), and
//! writes edits back in the format the directory already uses. The files are
//! locked after each write so the mail client's sync doesn't revert them.
//!
//! There is no UI here. Directory choosers and editors live in the caller;
//! the engine reports what it needs through typed errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use mailsig_core::{
//!     AppStateStore, BookmarkStore, DirectoryLocator, Session, SignatureContent,
//!     SignatureRepository,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> mailsig_core::Result<()> {
//!     let state = Arc::new(AppStateStore::open_default()?);
//!     let locator = DirectoryLocator::new(BookmarkStore::new(state));
//!     let repo = SignatureRepository::new(Session::locate(&locator)?)?;
//!
//!     let listed = repo.list().await?;
//!     println!("Found {} signatures", listed.signatures.len());
//!
//!     if let Some(first) = listed.signatures.first() {
//!         repo.update(first.signature_id(), SignatureContent::Html("<p>Jane</p>".into()))
//!             .await?;
//!         repo.save(first.signature_id()).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod codec;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod format;
pub mod html;
pub mod locator;
pub mod locks;
pub mod manifest;
pub mod parser;
pub mod platform;
pub mod rich;
pub mod webarchive;
pub mod writer;

mod atomic;
mod repository;
mod session;
mod signature;

// Re-export commonly used types
pub use access::{AccessGrant, AccessGuard, AccessScopes, AppStateStore, BookmarkStore};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use error::{Result, SignatureError};
pub use format::{DetectedFormat, DirectoryFormat, FileClass, SignatureFormat};
pub use locator::{DirectoryChoice, DirectoryLocator, DirectorySource, SignatureDirectory};
pub use manifest::{ManifestEntry, ManifestLayout, ManifestReport};
pub use platform::ProtectionPolicy;
pub use repository::{ListOutcome, RepositoryBuilder, SignatureRepository};
pub use rich::{Block, BlockKind, RichContent, RunStyle, TextRun};
pub use session::Session;
pub use signature::{Signature, SignatureContent};
pub use webarchive::WebArchive;
pub use writer::{PersistenceWriter, WriteReport};
