//! Payload format detection.
//!
//! Classifies single files through an ordered list of pure strategies (first
//! match wins) and determines a directory's dominant payload format by
//! majority vote.
//!
//! Strategy order:
//! 1. File extension (`mailsignature`, `webarchive`)
//! 2. Archive container signature (binary plist magic, or an XML plist
//!    holding a main resource)
//! 3. HTML structural markers in the leading bytes
//! 4. Plain text (valid UTF-8, non-empty, bounded length)

use crate::atomic::is_temp_file_name;
use crate::config::{MailPathsConfig, ParserConfig};
use crate::error::{Result, SignatureError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Magic bytes and markers for content sniffing.
mod magic {
    /// Binary property list header
    pub const BPLIST: &[u8; 8] = b"bplist00";
    /// Key present in every web archive
    pub const MAIN_RESOURCE_KEY: &str = "WebMainResource";
    /// Structural markers, matched ASCII case-insensitively
    pub const HTML_MARKERS: &[&str] = &["<html", "<body", "<div", "<p>", "<table", "<!doctype"];
}

/// On-disk payload format of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureFormat {
    /// HTML bytes stored directly (`.mailsignature`)
    RawHtml,
    /// HTML wrapped in a web archive container (`.webarchive`)
    WebArchive,
}

impl SignatureFormat {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            SignatureFormat::RawHtml => MailPathsConfig::RAW_EXTENSION,
            SignatureFormat::WebArchive => MailPathsConfig::ARCHIVE_EXTENSION,
        }
    }

    /// Match an extension case-insensitively.
    pub fn from_extension(extension: &str) -> Option<Self> {
        if extension.eq_ignore_ascii_case(MailPathsConfig::RAW_EXTENSION) {
            Some(SignatureFormat::RawHtml)
        } else if extension.eq_ignore_ascii_case(MailPathsConfig::ARCHIVE_EXTENSION) {
            Some(SignatureFormat::WebArchive)
        } else {
            None
        }
    }

    /// Payload file name for `signature_id`.
    pub fn file_name(&self, signature_id: &str) -> String {
        format!("{}.{}", signature_id, self.extension())
    }

    /// Lookup order when a signature may exist in either format.
    pub fn lookup_order() -> [SignatureFormat; 2] {
        [SignatureFormat::RawHtml, SignatureFormat::WebArchive]
    }
}

impl std::fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureFormat::RawHtml => write!(f, "raw HTML"),
            SignatureFormat::WebArchive => write!(f, "web archive"),
        }
    }
}

/// What a single file appears to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileClass {
    RawHtml,
    WebArchive,
    PlainText,
    Unrecognized,
}

impl FileClass {
    /// Whether the file can be loaded as a signature.
    pub fn is_signature(&self) -> bool {
        !matches!(self, FileClass::Unrecognized)
    }

    /// Format the file is parsed and written back as.
    ///
    /// Plain text is rewritten as HTML, so it maps to `RawHtml`.
    pub fn payload_format(&self) -> Option<SignatureFormat> {
        match self {
            FileClass::RawHtml | FileClass::PlainText => Some(SignatureFormat::RawHtml),
            FileClass::WebArchive => Some(SignatureFormat::WebArchive),
            FileClass::Unrecognized => None,
        }
    }
}

/// Which strategy produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    Extension,
    ArchiveSignature,
    HtmlMarkers,
    PlainText,
}

/// Outcome of classifying one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: FileClass,
    /// `None` when no strategy matched
    pub strategy: Option<DetectionStrategy>,
}

/// Input to the detection strategies.
#[derive(Debug, Clone, Copy)]
pub struct Peek<'a> {
    pub path: &'a Path,
    /// Leading bytes of the file
    pub head: &'a [u8],
    /// Whether `head` holds the whole file
    pub complete: bool,
}

type Strategy = fn(&Peek<'_>) -> Option<FileClass>;

/// Ordered strategy list. First match wins.
const STRATEGIES: &[(DetectionStrategy, Strategy)] = &[
    (DetectionStrategy::Extension, by_extension),
    (DetectionStrategy::ArchiveSignature, by_archive_signature),
    (DetectionStrategy::HtmlMarkers, by_html_markers),
    (DetectionStrategy::PlainText, by_plain_text),
];

fn by_extension(peek: &Peek<'_>) -> Option<FileClass> {
    let extension = peek.path.extension()?.to_str()?;
    match SignatureFormat::from_extension(extension)? {
        SignatureFormat::RawHtml => Some(FileClass::RawHtml),
        SignatureFormat::WebArchive => Some(FileClass::WebArchive),
    }
}

fn by_archive_signature(peek: &Peek<'_>) -> Option<FileClass> {
    is_archive_content(peek.head).then_some(FileClass::WebArchive)
}

fn by_html_markers(peek: &Peek<'_>) -> Option<FileClass> {
    has_html_markers(peek.head).then_some(FileClass::RawHtml)
}

fn by_plain_text(peek: &Peek<'_>) -> Option<FileClass> {
    (peek.complete && is_plain_text(peek.head)).then_some(FileClass::PlainText)
}

/// Whether `bytes` start like a web archive container.
pub fn is_archive_content(bytes: &[u8]) -> bool {
    if bytes.starts_with(magic::BPLIST) {
        return true;
    }
    let head = &bytes[..bytes.len().min(ParserConfig::SNIFF_BYTES)];
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start();
    (trimmed.starts_with("<?xml") || trimmed.starts_with("<plist"))
        && text.contains(magic::MAIN_RESOURCE_KEY)
}

/// Whether the leading bytes of `bytes` contain an HTML structural marker.
pub fn has_html_markers(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(ParserConfig::SNIFF_BYTES)];
    let lowered = String::from_utf8_lossy(head).to_ascii_lowercase();
    magic::HTML_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Whether `bytes` are a short, non-empty UTF-8 text.
pub fn is_plain_text(bytes: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return false;
    };
    let trimmed = text.trim();
    !trimmed.is_empty()
        && !trimmed.starts_with("<?xml")
        && !text.contains('\0')
        && text.chars().count() < ParserConfig::PLAIN_TEXT_MAX_CHARS
}

/// Run the strategies over `peek`.
pub fn classify(peek: &Peek<'_>) -> Classification {
    for (kind, strategy) in STRATEGIES {
        if let Some(class) = strategy(peek) {
            return Classification {
                class,
                strategy: Some(*kind),
            };
        }
    }
    Classification {
        class: FileClass::Unrecognized,
        strategy: None,
    }
}

/// Classify a file on disk.
pub fn classify_file(path: &Path) -> Result<Classification> {
    let (head, complete) = read_head(path, peek_len())?;
    Ok(classify(&Peek {
        path,
        head: &head,
        complete,
    }))
}

/// Bytes read per peek: enough for both the marker window and a full
/// plain-text candidate.
fn peek_len() -> usize {
    (ParserConfig::PLAIN_TEXT_MAX_CHARS * 4).max(ParserConfig::SNIFF_BYTES)
}

fn read_head(path: &Path, limit: usize) -> Result<(Vec<u8>, bool)> {
    let file = File::open(path).map_err(|e| SignatureError::io_with_path(e, path))?;
    let mut head = Vec::with_capacity(limit.min(64 * 1024));
    file.take(limit as u64 + 1)
        .read_to_end(&mut head)
        .map_err(|e| SignatureError::io_with_path(e, path))?;
    let complete = head.len() <= limit;
    head.truncate(limit);
    Ok((head, complete))
}

/// Whether a directory entry name can be a signature payload.
///
/// Hidden files, in-flight temp files, the manifest and other property
/// lists are never candidates.
pub fn is_candidate_name(file_name: &str) -> bool {
    if file_name.starts_with('.') || is_temp_file_name(file_name) {
        return false;
    }
    if file_name == MailPathsConfig::MANIFEST_FILENAME {
        return false;
    }
    !Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(MailPathsConfig::PLIST_EXTENSION))
}

/// Candidate payload files directly inside `directory`, sorted by name.
pub fn candidate_files(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(SignatureError::DirectoryNotFound {
            path: Some(directory.to_path_buf()),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(directory).to_path_buf();
            match e.into_io_error() {
                Some(io) => SignatureError::io_with_path(io, path),
                None => SignatureError::Other(format!("Failed to read {}", path.display())),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_candidate_name(name) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// The dominant format of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFormat {
    RawHtml,
    WebArchive,
    /// Nothing looked like HTML or an archive
    PlainTextFallback,
}

impl DetectedFormat {
    /// Format to use for a newly created signature.
    pub fn for_new_signature(&self) -> SignatureFormat {
        match self {
            DetectedFormat::WebArchive => SignatureFormat::WebArchive,
            DetectedFormat::RawHtml | DetectedFormat::PlainTextFallback => SignatureFormat::RawHtml,
        }
    }
}

/// Per-class counts over the sampled files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FormatCounts {
    pub raw_html: usize,
    pub web_archive: usize,
    pub plain_text: usize,
    pub unrecognized: usize,
}

impl FormatCounts {
    fn record(&mut self, class: FileClass) {
        match class {
            FileClass::RawHtml => self.raw_html += 1,
            FileClass::WebArchive => self.web_archive += 1,
            FileClass::PlainText => self.plain_text += 1,
            FileClass::Unrecognized => self.unrecognized += 1,
        }
    }

    /// Majority of archive vs raw, ties to `WebArchive`.
    fn majority(&self) -> Option<DetectedFormat> {
        if self.raw_html == 0 && self.web_archive == 0 {
            None
        } else if self.web_archive >= self.raw_html {
            Some(DetectedFormat::WebArchive)
        } else {
            Some(DetectedFormat::RawHtml)
        }
    }
}

/// Result of [`detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectoryFormat {
    pub format: DetectedFormat,
    pub counts: FormatCounts,
    /// Whether the vote needed content sniffing
    pub sniffed: bool,
}

/// Determine the dominant payload format of `directory`.
///
/// Counts candidates by extension first. Only when no candidate carries a
/// payload extension are file contents sniffed.
pub fn detect(directory: &Path) -> Result<DirectoryFormat> {
    let sample: Vec<PathBuf> = candidate_files(directory)?
        .into_iter()
        .take(ParserConfig::DETECT_SAMPLE_LIMIT)
        .collect();

    let mut counts = FormatCounts::default();
    for path in &sample {
        let peek = Peek {
            path,
            head: &[],
            complete: false,
        };
        if let Some(class) = by_extension(&peek) {
            counts.record(class);
        }
    }
    if let Some(format) = counts.majority() {
        debug!(
            "Detected {:?} in {} by extension ({:?})",
            format,
            directory.display(),
            counts
        );
        return Ok(DirectoryFormat {
            format,
            counts,
            sniffed: false,
        });
    }

    for path in &sample {
        match classify_file(path) {
            Ok(classification) => counts.record(classification.class),
            Err(e) => {
                debug!("Skipping {} during detection: {}", path.display(), e);
                counts.record(FileClass::Unrecognized);
            }
        }
    }
    let format = counts.majority().unwrap_or(DetectedFormat::PlainTextFallback);
    debug!(
        "Detected {:?} in {} by content ({:?})",
        format,
        directory.display(),
        counts
    );
    Ok(DirectoryFormat {
        format,
        counts,
        sniffed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn peek<'a>(path: &'a Path, head: &'a [u8]) -> Peek<'a> {
        Peek {
            path,
            head,
            complete: true,
        }
    }

    #[test]
    fn test_extension_strategy_wins_first() {
        let path = Path::new("A1.WebArchive");
        let result = classify(&peek(path, b"<html><body>hi</body></html>"));
        assert_eq!(result.class, FileClass::WebArchive);
        assert_eq!(result.strategy, Some(DetectionStrategy::Extension));
    }

    #[test]
    fn test_archive_signature_strategy() {
        let path = Path::new("A1.bin");
        assert_eq!(
            classify(&peek(path, b"bplist00\x01\x02")).strategy,
            Some(DetectionStrategy::ArchiveSignature)
        );

        let xml = b"<?xml version=\"1.0\"?><plist><dict><key>WebMainResource</key></dict></plist>";
        assert_eq!(classify(&peek(path, xml)).class, FileClass::WebArchive);
    }

    #[test]
    fn test_html_marker_strategy_is_case_insensitive() {
        let path = Path::new("sig");
        let result = classify(&peek(path, b"<!DOCTYPE html><HTML><BODY>x"));
        assert_eq!(result.class, FileClass::RawHtml);
        assert_eq!(result.strategy, Some(DetectionStrategy::HtmlMarkers));
    }

    #[test]
    fn test_plain_text_strategy() {
        let path = Path::new("sig.txt");
        let result = classify(&peek(path, b"Jane Doe\nAcme Corp"));
        assert_eq!(result.class, FileClass::PlainText);

        let truncated = Peek {
            path,
            head: b"Jane Doe",
            complete: false,
        };
        assert_eq!(classify(&truncated).class, FileClass::Unrecognized);
    }

    #[test]
    fn test_unrecognized() {
        let path = Path::new("image.png");
        assert_eq!(
            classify(&peek(path, &[0x89, b'P', b'N', b'G', 0xff, 0xfe])).class,
            FileClass::Unrecognized
        );
        assert_eq!(classify(&peek(path, b"   \n")).class, FileClass::Unrecognized);
    }

    #[test]
    fn test_candidate_names() {
        assert!(is_candidate_name("A1.webarchive"));
        assert!(is_candidate_name("notes"));
        assert!(!is_candidate_name("AllSignatures.plist"));
        assert!(!is_candidate_name("Other.PLIST"));
        assert!(!is_candidate_name(".DS_Store"));
        assert!(!is_candidate_name(".A1.webarchive.123.4.tmp"));
    }

    #[test]
    fn test_detect_majority_by_extension() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("A.webarchive"), b"x").unwrap();
        std::fs::write(tmp.path().join("B.webarchive"), b"x").unwrap();
        std::fs::write(tmp.path().join("C.mailsignature"), b"x").unwrap();
        std::fs::write(tmp.path().join("AllSignatures.plist"), b"x").unwrap();

        let result = detect(tmp.path()).unwrap();
        assert_eq!(result.format, DetectedFormat::WebArchive);
        assert_eq!(result.counts.web_archive, 2);
        assert_eq!(result.counts.raw_html, 1);
        assert!(!result.sniffed);
    }

    #[test]
    fn test_detect_tie_prefers_archive() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("A.webarchive"), b"x").unwrap();
        std::fs::write(tmp.path().join("B.mailsignature"), b"x").unwrap();

        assert_eq!(detect(tmp.path()).unwrap().format, DetectedFormat::WebArchive);
    }

    #[test]
    fn test_detect_sniffs_without_extensions() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("one"), b"<html><body>a</body></html>").unwrap();
        std::fs::write(tmp.path().join("two"), b"<div>b</div>").unwrap();

        let result = detect(tmp.path()).unwrap();
        assert_eq!(result.format, DetectedFormat::RawHtml);
        assert!(result.sniffed);
    }

    #[test]
    fn test_detect_plain_text_fallback() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("one"), b"Best,\nJane").unwrap();

        let result = detect(tmp.path()).unwrap();
        assert_eq!(result.format, DetectedFormat::PlainTextFallback);
        assert_eq!(
            result.format.for_new_signature(),
            SignatureFormat::RawHtml
        );
    }

    #[test]
    fn test_detect_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let err = detect(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, SignatureError::DirectoryNotFound { .. }));
    }
}
