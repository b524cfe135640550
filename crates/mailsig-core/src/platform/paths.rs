//! Platform-specific path utilities.
//!
//! This module provides functions to get platform-specific paths for:
//! - The mail client's default signatures directory
//! - The application state file

use crate::config::{AppStateConfig, MailPathsConfig};
use crate::error::{Result, SignatureError};
use std::path::PathBuf;

/// Get the mail client's default signatures directory.
///
/// # Platform Behavior
/// Resolved against the user's home directory on every platform:
/// `~/Library/Mail/V10/MailData/Signatures`. Only macOS hosts the mail
/// client, elsewhere the path normally does not exist and the locator
/// falls through to `DirectoryNotFound`.
pub fn default_signatures_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| SignatureError::Config {
        message: "Could not determine home directory".to_string(),
    })?;
    Ok(home.join(MailPathsConfig::DEFAULT_SIGNATURES_SUBPATH))
}

/// Get the application configuration directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/mailsig` (XDG_CONFIG_HOME)
/// - **Windows**: `%APPDATA%\mailsig`
/// - **macOS**: `~/Library/Application Support/mailsig`
pub fn app_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| SignatureError::Config {
        message: "Could not determine platform config directory".to_string(),
    })?;
    Ok(config_dir.join(AppStateConfig::APP_CONFIG_DIR_NAME))
}

/// Get the path to the persisted application state.
///
/// Returns `{app_config_dir}/state.json`.
pub fn app_state_path() -> Result<PathBuf> {
    Ok(app_config_dir()?.join(AppStateConfig::STATE_FILENAME))
}
