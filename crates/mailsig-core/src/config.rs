//! Centralized configuration for the signature engine.
//!
//! This module provides the on-disk names used by the mail client, the limits
//! applied by the heuristic parser, and the fixed values written into web
//! archive containers.

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "mailsig";
}

/// Names and locations used by the mail client.
pub struct MailPathsConfig;

impl MailPathsConfig {
    /// Default signatures root, relative to the user's home directory.
    pub const DEFAULT_SIGNATURES_SUBPATH: &'static str = "Library/Mail/V10/MailData/Signatures";
    pub const MANIFEST_FILENAME: &'static str = "AllSignatures.plist";
    pub const RAW_EXTENSION: &'static str = "mailsignature";
    pub const ARCHIVE_EXTENSION: &'static str = "webarchive";
    pub const PLIST_EXTENSION: &'static str = "plist";
}

/// Limits for format detection and heuristic name derivation.
pub struct ParserConfig;

impl ParserConfig {
    /// Maximum characters kept in a derived name before the ellipsis.
    pub const NAME_MAX_CHARS: usize = 30;
    pub const NAME_ELLIPSIS: &'static str = "...";
    /// Maximum characters of `<body>` text considered for a derived name.
    pub const BODY_SNIPPET_CHARS: usize = 100;
    /// Plain-text payloads longer than this are not treated as signatures.
    pub const PLAIN_TEXT_MAX_CHARS: usize = 10_000;
    /// Leading bytes read by the content sniffer.
    pub const SNIFF_BYTES: usize = 4096;
    /// Maximum directory entries sampled by the format detector.
    pub const DETECT_SAMPLE_LIMIT: usize = 64;
    /// Name used when the catalog declares no name.
    pub const DEFAULT_NAME: &'static str = "Untitled signature";
    /// Label prefixed to a filename stem when nothing better is found.
    pub const FILENAME_LABEL: &'static str = "Signature: ";
}

/// Fixed values written into a rebuilt web archive.
pub struct WebArchiveConfig;

impl WebArchiveConfig {
    pub const MIME_TYPE: &'static str = "text/html";
    pub const TEXT_ENCODING: &'static str = "UTF-8";
    pub const FRAME_NAME: &'static str = "";
    pub const PLACEHOLDER_URL: &'static str = "about:blank";
}

/// Persisted application state.
pub struct AppStateConfig;

impl AppStateConfig {
    pub const APP_CONFIG_DIR_NAME: &'static str = "mailsig";
    pub const STATE_FILENAME: &'static str = "state.json";
    /// Fixed key under which the directory access token is stored.
    pub const BOOKMARK_KEY: &'static str = "SignaturesDirectoryBookmark";
    pub const FIRST_LAUNCH_KEY: &'static str = "HasLaunchedBefore";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions_are_lowercase() {
        assert_eq!(
            MailPathsConfig::RAW_EXTENSION,
            MailPathsConfig::RAW_EXTENSION.to_lowercase()
        );
        assert_eq!(
            MailPathsConfig::ARCHIVE_EXTENSION,
            MailPathsConfig::ARCHIVE_EXTENSION.to_lowercase()
        );
    }
}
