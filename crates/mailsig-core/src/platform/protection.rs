//! Protect-after-write file attributes.
//!
//! The mail client re-syncs its signature files and will silently overwrite an
//! edited payload unless the file is locked. Every write therefore clears the
//! lock, replaces the file, and locks it again. Which lock is available
//! depends on the platform and the volume, so the behavior is a policy.

use crate::error::{Result, SignatureError};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::debug;

/// How a payload is locked against the mail client after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionPolicy {
    /// BSD user-immutable flag (`chflags uchg`). macOS only.
    ImmutableFlag,
    /// Remove write permission bits.
    ReadOnly,
    /// The store has no usable attribute; writes are left unprotected.
    Disabled,
}

impl ProtectionPolicy {
    /// The strongest policy the current platform supports.
    ///
    /// # Platform Behavior
    /// - **macOS**: `ImmutableFlag`
    /// - **Other Unix / Windows**: `ReadOnly`
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            ProtectionPolicy::ImmutableFlag
        } else {
            ProtectionPolicy::ReadOnly
        }
    }

    /// Whether this policy sets any attribute at all.
    pub fn supports_attribute(&self) -> bool {
        !matches!(self, ProtectionPolicy::Disabled)
    }

    /// Check whether `path` currently carries this policy's attribute.
    pub fn is_protected(&self, path: &Path) -> Result<bool> {
        match self {
            ProtectionPolicy::ImmutableFlag => immutable::is_set(path),
            ProtectionPolicy::ReadOnly => {
                let metadata =
                    std::fs::metadata(path).map_err(|e| SignatureError::io_with_path(e, path))?;
                Ok(metadata.permissions().readonly())
            }
            ProtectionPolicy::Disabled => Ok(false),
        }
    }

    /// Remove the attribute from `path` so it can be replaced or deleted.
    ///
    /// A missing file or an attribute that isn't set is not an error.
    /// Returns whether an attribute was actually cleared.
    pub fn clear(&self, path: &Path) -> Result<bool> {
        if !self.supports_attribute() || !path.exists() {
            return Ok(false);
        }
        if !self.is_protected(path)? {
            return Ok(false);
        }

        let result = match self {
            ProtectionPolicy::ImmutableFlag => immutable::set(path, false),
            ProtectionPolicy::ReadOnly => set_readonly(path, false),
            ProtectionPolicy::Disabled => Ok(()),
        };
        result.map_err(|e| SignatureError::ImmutableFlagFailed {
            path: path.to_path_buf(),
            message: format!("could not clear protection: {}", e),
        })?;

        debug!("Cleared {:?} protection on {}", self, path.display());
        Ok(true)
    }

    /// Put the attribute back on `path`.
    pub fn apply(&self, path: &Path) -> Result<()> {
        let result = match self {
            ProtectionPolicy::ImmutableFlag => immutable::set(path, true),
            ProtectionPolicy::ReadOnly => set_readonly(path, true),
            ProtectionPolicy::Disabled => return Ok(()),
        };
        result.map_err(|e| SignatureError::ImmutableFlagFailed {
            path: path.to_path_buf(),
            message: format!("could not apply protection: {}", e),
        })?;

        debug!("Applied {:?} protection on {}", self, path.display());
        Ok(())
    }
}

impl Default for ProtectionPolicy {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Toggle write permission.
///
/// # Platform Behavior
/// - **Linux/macOS**: clears or restores the owner/group/other write bits
///   (restoring only grants the owner write bit)
/// - **Windows**: toggles the read-only attribute
fn set_readonly(path: &Path, readonly: bool) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = std::fs::metadata(path)?.permissions();
        let mode = permissions.mode();
        let mode = if readonly { mode & !0o222 } else { mode | 0o200 };
        permissions.set_mode(mode);
        std::fs::set_permissions(path, permissions)
    }

    #[cfg(windows)]
    {
        let mut permissions = std::fs::metadata(path)?.permissions();
        permissions.set_readonly(readonly);
        std::fs::set_permissions(path, permissions)
    }
}

#[cfg(target_os = "macos")]
mod immutable {
    use super::*;
    use std::ffi::CString;
    use std::os::macos::fs::MetadataExt;
    use std::os::unix::ffi::OsStrExt;

    /// `UF_IMMUTABLE` from `<sys/stat.h>`.
    const UF_IMMUTABLE: u32 = 0x0000_0002;

    pub(super) fn is_set(path: &Path) -> Result<bool> {
        let metadata =
            std::fs::symlink_metadata(path).map_err(|e| SignatureError::io_with_path(e, path))?;
        Ok(metadata.st_flags() & UF_IMMUTABLE != 0)
    }

    pub(super) fn set(path: &Path, immutable: bool) -> io::Result<()> {
        let flags = std::fs::symlink_metadata(path)?.st_flags();
        let flags = if immutable {
            flags | UF_IMMUTABLE
        } else {
            flags & !UF_IMMUTABLE
        };
        chflags(path, flags)
    }

    #[allow(unsafe_code)]
    fn chflags(path: &Path, flags: u32) -> io::Result<()> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;
        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call,
        // and chflags does not retain the pointer.
        let rc = unsafe { libc::chflags(c_path.as_ptr(), flags as libc::c_uint) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(target_os = "macos"))]
mod immutable {
    use super::*;

    pub(super) fn is_set(_path: &Path) -> Result<bool> {
        Ok(false)
    }

    pub(super) fn set(_path: &Path, _immutable: bool) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "immutable flag is not supported on this platform",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_platform_default() {
        let policy = ProtectionPolicy::platform_default();

        #[cfg(target_os = "macos")]
        assert_eq!(policy, ProtectionPolicy::ImmutableFlag);

        #[cfg(not(target_os = "macos"))]
        assert_eq!(policy, ProtectionPolicy::ReadOnly);
    }

    #[test]
    fn test_readonly_apply_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("A1.mailsignature");
        File::create(&path).unwrap();

        let policy = ProtectionPolicy::ReadOnly;
        assert!(!policy.is_protected(&path).unwrap());

        policy.apply(&path).unwrap();
        assert!(policy.is_protected(&path).unwrap());

        assert!(policy.clear(&path).unwrap());
        assert!(!policy.is_protected(&path).unwrap());

        // Clearing an unprotected file is a no-op.
        assert!(!policy.clear(&path).unwrap());
    }

    #[test]
    fn test_clear_missing_file_is_tolerated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.webarchive");
        assert!(!ProtectionPolicy::ReadOnly.clear(&path).unwrap());
        assert!(!ProtectionPolicy::ImmutableFlag.clear(&path).unwrap());
    }

    #[test]
    fn test_disabled_policy_never_touches_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("A1.mailsignature");
        File::create(&path).unwrap();

        let policy = ProtectionPolicy::Disabled;
        assert!(!policy.supports_attribute());
        policy.apply(&path).unwrap();
        assert!(!policy.is_protected(&path).unwrap());
        assert!(!std::fs::metadata(&path).unwrap().permissions().readonly());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_immutable_flag_unsupported_off_macos() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("A1.mailsignature");
        File::create(&path).unwrap();

        let err = ProtectionPolicy::ImmutableFlag.apply(&path).unwrap_err();
        assert!(matches!(err, SignatureError::ImmutableFlagFailed { .. }));
    }
}
