//! Atomic file operations.
//!
//! Implements atomic writes using:
//! 1. Write to a hidden temp file in the target's directory with a PID+TID suffix
//! 2. fsync to ensure data reaches disk
//! 3. Atomic rename to target path
//!
//! The temp file lives next to the target so the rename never crosses a
//! filesystem boundary. On any failure the temp file is removed and the
//! target is left as it was.

use crate::{Result, SignatureError};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::{debug, warn};

/// Suffix of in-flight temp files. Directory scans skip these.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut file = File::open(path).map_err(|e| SignatureError::io_with_path(e, path))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| SignatureError::io_with_path(e, path))?;

    let data: T = serde_json::from_str(&contents).map_err(|e| SignatureError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically, creating parent directories.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| SignatureError::io_with_path(e, parent))?;
        }
    }

    let serialized = serde_json::to_string_pretty(data).map_err(|e| SignatureError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    atomic_write_bytes(path, serialized.as_bytes())?;
    Ok(())
}

/// Replace `path` with `bytes` atomically. Returns the number of bytes written.
///
/// The parent directory must already exist.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<usize> {
    let temp_path = temp_path_for(path);

    if let Err(e) = write_synced(&temp_path, bytes) {
        discard_temp(&temp_path);
        return Err(SignatureError::write_failed(path, e));
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        discard_temp(&temp_path);
        return Err(SignatureError::WriteFailed {
            path: path.to_path_buf(),
            message: format!("Failed to rename {} into place: {}", temp_path.display(), e),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes.len())
}

/// Whether `file_name` looks like an in-flight temp file from [`atomic_write_bytes`].
pub fn is_temp_file_name(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(TEMP_SUFFIX)
}

fn write_synced(temp_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

fn discard_temp(temp_path: &Path) {
    if temp_path.exists() {
        if let Err(e) = fs::remove_file(temp_path) {
            warn!("Failed to remove temp file {}: {}", temp_path.display(), e);
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_name = format!(
        ".{}.{}.{}{}",
        file_name,
        process::id(),
        thread_id(),
        TEMP_SUFFIX
    );
    path.with_file_name(temp_name)
}

/// Get a unique thread identifier.
fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", thread::current().id()).hash(&mut hasher);
    hasher.finish()
}
