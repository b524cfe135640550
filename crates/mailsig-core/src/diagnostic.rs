//! Non-fatal findings collected while loading a signatures directory.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The catalog file exists but could not be parsed
    ManifestUnreadable,
    /// The catalog parsed but its root has an unexpected shape
    ManifestLayout,
    /// A catalog entry was missing required keys
    ManifestEntrySkipped,
    /// A catalog entry has no payload file on disk
    UnresolvedEntry,
    /// A payload file could not be loaded
    FileSkipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            signature_id: None,
            path: None,
            message: message.into(),
        }
    }

    pub fn with_signature(mut self, signature_id: impl Into<String>) -> Self {
        self.signature_id = Some(signature_id.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(id) = &self.signature_id {
            write!(f, " [{}]", id)?;
        }
        if let Some(path) = &self.path {
            write!(f, " {}", path.display())?;
        }
        write!(f, ": {}", self.message)
    }
}
