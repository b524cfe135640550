//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live in this module rather
//! than being scattered throughout the codebase.
//!
//! - `paths` - Default signatures directory and application state location
//! - `protection` - Protect-after-write file attributes (immutable flag, read-only bits)

pub mod paths;
pub mod protection;

pub use paths::{app_state_path, default_signatures_dir};
pub use protection::ProtectionPolicy;

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}

/// Returns true if the mail client whose signatures we edit can run here.
pub fn hosts_mail_client() -> bool {
    cfg!(target_os = "macos")
}
