//! Signature catalog (`AllSignatures.plist`) parsing.
//!
//! The catalog only supplies display names and existence hints; payload
//! files are always authoritative for content. Parsing is tolerant: bad
//! entries are skipped and reported, and only a file that is not a property
//! list at all fails the parse.
//!
//! Two layouts are accepted:
//! - `{SignaturesByAccountID: {<account>: {SignaturesList: [entry, ..]}}}`
//! - a flat array of entries (account `""`)

use crate::atomic::atomic_write_bytes;
use crate::config::{MailPathsConfig, ParserConfig};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::error::{Result, SignatureError};
use crate::format::SignatureFormat;
use plist::{Dictionary, Value};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

mod keys {
    pub const BY_ACCOUNT: &str = "SignaturesByAccountID";
    pub const LIST: &str = "SignaturesList";
    pub const ID: &str = "SignatureID";
    pub const UNIQUE_ID: &str = "SignatureUniqueId";
    pub const NAME: &str = "SignatureName";
}

const BINARY_MAGIC: &[u8] = b"bplist00";

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub account_id: String,
    pub signature_id: String,
    pub declared_name: Option<String>,
}

impl ManifestEntry {
    /// Declared name, or the default name when the catalog has none.
    pub fn display_name(&self) -> String {
        self.declared_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| ParserConfig::DEFAULT_NAME.to_string())
    }
}

/// Shape of the catalog root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestLayout {
    ByAccount,
    Flat,
    Unknown,
}

/// Entries plus everything that was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedManifest {
    pub layout: ManifestLayout,
    pub entries: Vec<ManifestEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse the catalog at `path`.
///
/// Fails with [`SignatureError::ManifestParseFailed`] only when the file
/// can't be read or isn't a property list.
pub fn parse(path: &Path) -> Result<ParsedManifest> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => SignatureError::io_with_path(e, path),
        _ => SignatureError::ManifestParseFailed {
            message: format!("{}: {}", path.display(), e),
        },
    })?;
    parse_bytes(&bytes)
}

/// Parse catalog bytes (binary or XML property list).
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedManifest> {
    let root = Value::from_reader(Cursor::new(bytes)).map_err(|e| {
        SignatureError::ManifestParseFailed {
            message: e.to_string(),
        }
    })?;

    let mut parsed = ParsedManifest {
        layout: ManifestLayout::Unknown,
        entries: Vec::new(),
        diagnostics: Vec::new(),
    };

    match &root {
        Value::Dictionary(dict) => match dict.get(keys::BY_ACCOUNT).and_then(Value::as_dictionary) {
            Some(accounts) => {
                parsed.layout = ManifestLayout::ByAccount;
                parse_accounts(accounts, &mut parsed);
            }
            None => {
                let root_keys: Vec<&str> = dict.keys().map(String::as_str).collect();
                parsed.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::ManifestLayout,
                    format!(
                        "catalog has no {} dictionary (root keys: {})",
                        keys::BY_ACCOUNT,
                        root_keys.join(", ")
                    ),
                ));
            }
        },
        Value::Array(items) => {
            parsed.layout = ManifestLayout::Flat;
            parse_list("", items, &mut parsed);
        }
        _ => {
            parsed.diagnostics.push(Diagnostic::new(
                DiagnosticKind::ManifestLayout,
                "catalog root is neither a dictionary nor an array",
            ));
        }
    }

    debug!(
        "Parsed catalog: {} entries, {} diagnostics",
        parsed.entries.len(),
        parsed.diagnostics.len()
    );
    Ok(parsed)
}

fn parse_accounts(accounts: &Dictionary, parsed: &mut ParsedManifest) {
    for (account_id, account) in accounts {
        let list = account
            .as_dictionary()
            .and_then(|a| a.get(keys::LIST))
            .and_then(Value::as_array);
        match list {
            Some(items) => parse_list(account_id, items, parsed),
            None => parsed.diagnostics.push(Diagnostic::new(
                DiagnosticKind::ManifestEntrySkipped,
                format!("account '{}' has no {}", account_id, keys::LIST),
            )),
        }
    }
}

fn parse_list(account_id: &str, items: &[Value], parsed: &mut ParsedManifest) {
    for (index, item) in items.iter().enumerate() {
        match parse_entry(account_id, item) {
            Some(entry) => parsed.entries.push(entry),
            None => parsed.diagnostics.push(Diagnostic::new(
                DiagnosticKind::ManifestEntrySkipped,
                format!(
                    "entry {} of account '{}' has no signature identifier",
                    index, account_id
                ),
            )),
        }
    }
}

fn parse_entry(account_id: &str, item: &Value) -> Option<ManifestEntry> {
    let dict = item.as_dictionary()?;
    let signature_id = [keys::ID, keys::UNIQUE_ID]
        .iter()
        .filter_map(|key| dict.get(*key).and_then(Value::as_string))
        .map(str::trim)
        .find(|id| !id.is_empty())?;
    let declared_name = dict
        .get(keys::NAME)
        .and_then(Value::as_string)
        .map(str::to_string);

    Some(ManifestEntry {
        account_id: account_id.to_string(),
        signature_id: signature_id.to_string(),
        declared_name,
    })
}

/// A catalog entry with its payload file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    pub entry: ManifestEntry,
    pub payload_path: PathBuf,
    pub format: SignatureFormat,
}

/// Find the payload file for `signature_id`, raw extension first.
pub fn find_payload(directory: &Path, signature_id: &str) -> Option<(PathBuf, SignatureFormat)> {
    SignatureFormat::lookup_order().into_iter().find_map(|format| {
        let path = directory.join(format.file_name(signature_id));
        path.is_file().then_some((path, format))
    })
}

/// Cross-reference entries against `directory`.
///
/// Entries without a payload file are reported and left out. A signature
/// listed under several accounts is resolved once.
pub fn resolve(
    entries: &[ManifestEntry],
    directory: &Path,
) -> (Vec<ResolvedEntry>, Vec<Diagnostic>) {
    let mut resolved = Vec::new();
    let mut diagnostics = Vec::new();
    let mut seen = HashSet::new();

    for entry in entries {
        if !seen.insert(entry.signature_id.as_str()) {
            continue;
        }
        match find_payload(directory, &entry.signature_id) {
            Some((payload_path, format)) => resolved.push(ResolvedEntry {
                entry: entry.clone(),
                payload_path,
                format,
            }),
            None => {
                warn!(
                    "Catalog lists {} but no payload file exists",
                    entry.signature_id
                );
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::UnresolvedEntry,
                        format!(
                            "no {} or {} file for catalog entry '{}'",
                            MailPathsConfig::RAW_EXTENSION,
                            MailPathsConfig::ARCHIVE_EXTENSION,
                            entry.display_name()
                        ),
                    )
                    .with_signature(&entry.signature_id),
                );
            }
        }
    }
    (resolved, diagnostics)
}

/// Per-account entry count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub account_id: String,
    pub entry_count: usize,
}

/// Result of [`analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct ManifestReport {
    pub manifest_path: PathBuf,
    pub present: bool,
    pub layout: Option<ManifestLayout>,
    pub accounts: Vec<AccountSummary>,
    pub resolved: Vec<ResolvedEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse and cross-reference the catalog in `directory`.
///
/// Never fails on catalog problems; they become diagnostics.
pub fn analyze(directory: &Path) -> ManifestReport {
    let manifest_path = directory.join(MailPathsConfig::MANIFEST_FILENAME);
    let mut report = ManifestReport {
        manifest_path: manifest_path.clone(),
        present: manifest_path.is_file(),
        layout: None,
        accounts: Vec::new(),
        resolved: Vec::new(),
        diagnostics: Vec::new(),
    };
    if !report.present {
        return report;
    }

    let parsed = match parse(&manifest_path) {
        Ok(parsed) => parsed,
        Err(e) => {
            report.diagnostics.push(
                Diagnostic::new(DiagnosticKind::ManifestUnreadable, e.to_string())
                    .with_path(&manifest_path),
            );
            return report;
        }
    };

    for entry in &parsed.entries {
        match report
            .accounts
            .iter_mut()
            .find(|a| a.account_id == entry.account_id)
        {
            Some(summary) => summary.entry_count += 1,
            None => report.accounts.push(AccountSummary {
                account_id: entry.account_id.clone(),
                entry_count: 1,
            }),
        }
    }

    let (resolved, unresolved) = resolve(&parsed.entries, directory);
    report.layout = Some(parsed.layout);
    report.resolved = resolved;
    report.diagnostics = parsed.diagnostics;
    report.diagnostics.extend(unresolved);
    report
}

/// Set the declared name of every catalog entry for `signature_id`.
///
/// Returns how many entries were changed; a missing catalog changes none.
/// The file is rewritten in its original encoding (binary or XML).
pub fn rename_entries(path: &Path, signature_id: &str, name: &str) -> Result<usize> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(SignatureError::io_with_path(e, path)),
    };
    let mut root = Value::from_reader(Cursor::new(&bytes)).map_err(|e| {
        SignatureError::ManifestParseFailed {
            message: format!("{}: {}", path.display(), e),
        }
    })?;

    let mut renamed = 0;
    let mut rename_list = |items: &mut Vec<Value>| {
        for item in items.iter_mut().filter_map(Value::as_dictionary_mut) {
            let matches = [keys::ID, keys::UNIQUE_ID].iter().any(|key| {
                item.get(*key)
                    .and_then(Value::as_string)
                    .is_some_and(|id| id.trim() == signature_id)
            });
            if matches {
                item.insert(keys::NAME.into(), Value::String(name.to_string()));
                renamed += 1;
            }
        }
    };
    match &mut root {
        Value::Dictionary(dict) => {
            if let Some(accounts) = dict
                .get_mut(keys::BY_ACCOUNT)
                .and_then(Value::as_dictionary_mut)
            {
                for account in accounts.values_mut() {
                    if let Some(items) = account
                        .as_dictionary_mut()
                        .and_then(|a| a.get_mut(keys::LIST))
                        .and_then(Value::as_array_mut)
                    {
                        rename_list(items);
                    }
                }
            }
        }
        Value::Array(items) => rename_list(items),
        _ => {}
    }

    if renamed == 0 {
        debug!("Catalog has no entry for {}", signature_id);
        return Ok(0);
    }

    let mut out = Vec::new();
    let written = if bytes.starts_with(BINARY_MAGIC) {
        root.to_writer_binary(&mut out)
    } else {
        root.to_writer_xml(&mut out)
    };
    written.map_err(|e| SignatureError::WriteFailed {
        path: path.to_path_buf(),
        message: format!("Failed to encode catalog: {}", e),
        source: None,
    })?;
    atomic_write_bytes(path, &out)?;
    debug!("Renamed {} catalog entries for {}", renamed, signature_id);
    Ok(renamed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: Option<&str>, name: Option<&str>) -> Value {
        let mut dict = Dictionary::new();
        if let Some(id) = id {
            dict.insert(keys::ID.into(), Value::String(id.into()));
        }
        if let Some(name) = name {
            dict.insert(keys::NAME.into(), Value::String(name.into()));
        }
        Value::Dictionary(dict)
    }

    fn by_account(accounts: Vec<(&str, Vec<Value>)>) -> Vec<u8> {
        let mut by_account = Dictionary::new();
        for (account, list) in accounts {
            let mut account_dict = Dictionary::new();
            account_dict.insert(keys::LIST.into(), Value::Array(list));
            by_account.insert(account.into(), Value::Dictionary(account_dict));
        }
        let mut root = Dictionary::new();
        root.insert(keys::BY_ACCOUNT.into(), Value::Dictionary(by_account));
        let mut bytes = Vec::new();
        Value::Dictionary(root).to_writer_xml(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_parse_by_account_skips_bad_entries() {
        let bytes = by_account(vec![
            (
                "acct-1",
                vec![
                    entry(Some("A1"), Some("Work")),
                    entry(None, Some("Nameless id")),
                    entry(Some("A2"), None),
                ],
            ),
            ("acct-2", vec![entry(Some("B1"), Some("Home"))]),
        ]);

        let parsed = parse_bytes(&bytes).unwrap();
        assert_eq!(parsed.layout, ManifestLayout::ByAccount);
        let ids: Vec<&str> = parsed.entries.iter().map(|e| e.signature_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A2", "B1"]);
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.entries[1].display_name(), "Untitled signature");
        assert_eq!(parsed.entries[2].account_id, "acct-2");
    }

    #[test]
    fn test_parse_flat_layout() {
        let mut item = Dictionary::new();
        item.insert(keys::UNIQUE_ID.into(), Value::String("C3".into()));
        item.insert(keys::NAME.into(), Value::String("Flat".into()));
        let mut bytes = Vec::new();
        Value::Array(vec![Value::Dictionary(item)])
            .to_writer_binary(&mut bytes)
            .unwrap();

        let parsed = parse_bytes(&bytes).unwrap();
        assert_eq!(parsed.layout, ManifestLayout::Flat);
        assert_eq!(parsed.entries[0].signature_id, "C3");
        assert_eq!(parsed.entries[0].account_id, "");
    }

    #[test]
    fn test_unexpected_root_is_not_fatal() {
        let mut root = Dictionary::new();
        root.insert("Something".into(), Value::Boolean(true));
        let mut bytes = Vec::new();
        Value::Dictionary(root).to_writer_xml(&mut bytes).unwrap();

        let parsed = parse_bytes(&bytes).unwrap();
        assert!(parsed.entries.is_empty());
        assert_eq!(parsed.diagnostics[0].kind, DiagnosticKind::ManifestLayout);
        assert!(parsed.diagnostics[0].message.contains("Something"));
    }

    #[test]
    fn test_garbage_fails_parse() {
        let err = parse_bytes(b"definitely not a plist").unwrap_err();
        assert!(matches!(err, SignatureError::ManifestParseFailed { .. }));
    }

    #[test]
    fn test_resolve_prefers_raw_and_reports_missing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("A1.mailsignature"), b"<p>raw</p>").unwrap();
        std::fs::write(tmp.path().join("A1.webarchive"), b"archive").unwrap();

        let entries = vec![
            ManifestEntry {
                account_id: "acct".into(),
                signature_id: "A1".into(),
                declared_name: Some("Work".into()),
            },
            ManifestEntry {
                account_id: "acct".into(),
                signature_id: "B2".into(),
                declared_name: Some("Work".into()),
            },
        ];
        let (resolved, diagnostics) = resolve(&entries, tmp.path());

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].format, SignatureFormat::RawHtml);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].signature_id.as_deref(), Some("B2"));
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnresolvedEntry);
    }

    #[test]
    fn test_analyze_report() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(MailPathsConfig::MANIFEST_FILENAME),
            by_account(vec![
                ("acct-1", vec![entry(Some("A1"), Some("Work"))]),
                ("acct-2", vec![entry(Some("A1"), Some("Work")), entry(Some("B2"), None)]),
            ]),
        )
        .unwrap();
        std::fs::write(tmp.path().join("A1.webarchive"), b"x").unwrap();

        let report = analyze(tmp.path());
        assert!(report.present);
        assert_eq!(report.layout, Some(ManifestLayout::ByAccount));
        assert_eq!(report.accounts.len(), 2);
        assert_eq!(report.accounts[1].entry_count, 2);
        assert_eq!(report.resolved.len(), 1);
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn test_analyze_without_manifest() {
        let tmp = TempDir::new().unwrap();
        let report = analyze(tmp.path());
        assert!(!report.present);
        assert!(report.resolved.is_empty());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_rename_entries_in_every_account() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(MailPathsConfig::MANIFEST_FILENAME);
        std::fs::write(
            &path,
            by_account(vec![
                ("acct-1", vec![entry(Some("A1"), Some("Work"))]),
                ("acct-2", vec![entry(Some("A1"), Some("Work")), entry(Some("B2"), Some("Home"))]),
            ]),
        )
        .unwrap();

        assert_eq!(rename_entries(&path, "A1", "Office").unwrap(), 2);

        let parsed = parse(&path).unwrap();
        let names: Vec<(&str, String)> = parsed
            .entries
            .iter()
            .map(|e| (e.signature_id.as_str(), e.display_name()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("A1", "Office".to_string()),
                ("A1", "Office".to_string()),
                ("B2", "Home".to_string()),
            ]
        );
        assert!(std::fs::read(&path).unwrap().starts_with(b"<?xml"));
    }

    #[test]
    fn test_rename_entries_keeps_binary_encoding() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(MailPathsConfig::MANIFEST_FILENAME);
        let mut bytes = Vec::new();
        Value::Array(vec![entry(Some("C3"), Some("Flat"))])
            .to_writer_binary(&mut bytes)
            .unwrap();
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(rename_entries(&path, "C3", "Renamed").unwrap(), 1);
        assert!(std::fs::read(&path).unwrap().starts_with(BINARY_MAGIC));
        assert_eq!(parse(&path).unwrap().entries[0].display_name(), "Renamed");
    }

    #[test]
    fn test_rename_entries_without_match() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(MailPathsConfig::MANIFEST_FILENAME);
        assert_eq!(rename_entries(&path, "A1", "x").unwrap(), 0);

        let original = by_account(vec![("acct", vec![entry(Some("B2"), Some("Home"))])]);
        std::fs::write(&path, &original).unwrap();
        assert_eq!(rename_entries(&path, "A1", "x").unwrap(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), original);

        std::fs::write(&path, b"not a plist").unwrap();
        assert!(matches!(
            rename_entries(&path, "A1", "x").unwrap_err(),
            SignatureError::ManifestParseFailed { .. }
        ));
    }
}
