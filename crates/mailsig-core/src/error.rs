//! Error types for the signature engine.
//!
//! Every failure the engine can surface is a variant of [`SignatureError`].
//! Messages are written for end users: the UI layer shows `to_string()` as-is.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the signature engine.
#[derive(Debug, Error)]
pub enum SignatureError {
    // Directory access errors
    #[error("Signatures directory not found{}", .path.as_ref().map(|p| format!(": {}", p.display())).unwrap_or_default())]
    DirectoryNotFound { path: Option<PathBuf> },

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Access to the signatures directory has expired{}, please select it again", .path.as_ref().map(|p| format!(" ({})", p.display())).unwrap_or_default())]
    BookmarkStale { path: Option<PathBuf> },

    // Parsing errors
    #[error("Signature catalog could not be parsed: {message}")]
    ManifestParseFailed { message: String },

    #[error("Unrecognized signature file {path}: {reason}")]
    FormatUnrecognized { path: PathBuf, reason: String },

    #[error("Could not decode signature content in {path}: {message}")]
    ContentDecodeFailed { path: PathBuf, message: String },

    // Writing errors
    #[error("Failed to write {path}: {message}")]
    WriteFailed {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to change protection of {path}: {message}")]
    ImmutableFlagFailed { path: PathBuf, message: String },

    // Repository errors
    #[error("Signature not found: {signature_id}")]
    SignatureNotFound { signature_id: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("Property list error: {message}")]
    Plist {
        message: String,
        #[source]
        source: Option<plist::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for signature operations.
pub type Result<T> = std::result::Result<T, SignatureError>;

// Conversion implementations for common error types

impl From<std::io::Error> for SignatureError {
    fn from(err: std::io::Error) -> Self {
        SignatureError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SignatureError {
    fn from(err: serde_json::Error) -> Self {
        SignatureError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<plist::Error> for SignatureError {
    fn from(err: plist::Error) -> Self {
        SignatureError::Plist {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<tokio::task::JoinError> for SignatureError {
    fn from(err: tokio::task::JoinError) -> Self {
        SignatureError::Other(format!("Background task failed: {}", err))
    }
}

impl SignatureError {
    /// Create an IO error with path context.
    ///
    /// `PermissionDenied` IO errors are promoted to [`SignatureError::PermissionDenied`]
    /// so callers can route them to the directory grant flow.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return SignatureError::PermissionDenied(path);
        }
        SignatureError::Io {
            message: err.to_string(),
            path: Some(path),
            source: Some(err),
        }
    }

    /// Create a write failure for `path`.
    pub fn write_failed(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        SignatureError::WriteFailed {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Directory-level failures block the UI until the user grants a directory.
    pub fn requires_directory_grant(&self) -> bool {
        matches!(
            self,
            SignatureError::DirectoryNotFound { .. }
                | SignatureError::PermissionDenied(_)
                | SignatureError::BookmarkStale { .. }
        )
    }

    /// Failures confined to a single payload file.
    ///
    /// During a load these are recorded as diagnostics and the file is skipped.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            SignatureError::FormatUnrecognized { .. }
                | SignatureError::ContentDecodeFailed { .. }
                | SignatureError::Plist { .. }
                | SignatureError::Io { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SignatureError::SignatureNotFound {
            signature_id: "A1".into(),
        };
        assert_eq!(err.to_string(), "Signature not found: A1");

        let err = SignatureError::DirectoryNotFound { path: None };
        assert_eq!(err.to_string(), "Signatures directory not found");

        let err = SignatureError::DirectoryNotFound {
            path: Some(PathBuf::from("/tmp/sigs")),
        };
        assert_eq!(err.to_string(), "Signatures directory not found: /tmp/sigs");
    }

    #[test]
    fn test_requires_directory_grant() {
        assert!(SignatureError::BookmarkStale { path: None }.requires_directory_grant());
        assert!(SignatureError::PermissionDenied(PathBuf::from("/x")).requires_directory_grant());
        assert!(!SignatureError::ManifestParseFailed {
            message: "bad".into()
        }
        .requires_directory_grant());
    }

    #[test]
    fn test_io_permission_denied_is_promoted() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = SignatureError::io_with_path(io, "/root/sigs");
        assert!(matches!(err, SignatureError::PermissionDenied(_)));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = SignatureError::io_with_path(io, "/root/sigs");
        assert!(err.is_per_file());
    }
}
