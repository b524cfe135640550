//! Builds [`Signature`] records from payload files.
//!
//! With catalog metadata the display name comes from the catalog. Without it
//! the name is guessed from the content: the `<title>`, then the first text
//! of a `<p>`, `<div>`, `<span>` or `<body>`, then the file name.

use crate::codec;
use crate::config::ParserConfig;
use crate::error::{Result, SignatureError};
use crate::format::{self, FileClass, Peek};
use crate::html;
use crate::manifest::ManifestEntry;
use crate::signature::Signature;
use crate::webarchive::{self, WebArchive};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title(?:\s[^>]*)?>(.*?)</title\s*>").unwrap());

/// Elements searched for a name, in priority order.
static NAME_SOURCES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    ["p", "div", "span", "body"]
        .into_iter()
        .map(|tag| {
            let pattern = format!(r"(?is)<{tag}(?:\s[^>]*)?>(.*?)</{tag}\s*>");
            (tag, Regex::new(&pattern).unwrap())
        })
        .collect()
});

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n\s*").unwrap());

/// Parse the payload at `path`.
///
/// `metadata` is the matching catalog entry, when there is one.
pub fn parse(path: &Path, metadata: Option<&ManifestEntry>) -> Result<Signature> {
    let bytes = std::fs::read(path).map_err(|e| SignatureError::io_with_path(e, path))?;
    parse_bytes(path, &bytes, metadata)
}

/// Parse payload bytes read from `path`.
pub fn parse_bytes(
    path: &Path,
    bytes: &[u8],
    metadata: Option<&ManifestEntry>,
) -> Result<Signature> {
    let signature_id = file_stem(path)?;
    let classification = format::classify(&Peek {
        path,
        head: bytes,
        complete: true,
    });
    let payload_format =
        classification
            .class
            .payload_format()
            .ok_or_else(|| SignatureError::FormatUnrecognized {
                path: path.to_path_buf(),
                reason: "content is neither a web archive, HTML nor short plain text".to_string(),
            })?;

    let decoded = match classification.class {
        FileClass::WebArchive => WebArchive::from_bytes(bytes, path)?.html(path)?,
        _ => webarchive::decode_text(bytes, None, path)?,
    };

    // Only sniffed plain text is wrapped; a raw payload is HTML as stored.
    let is_text = classification.class == FileClass::PlainText;
    let canonical_html = if is_text {
        wrap_plain_text(&decoded)
    } else {
        decoded
    };

    let display_name = match metadata {
        Some(entry) => entry.display_name(),
        None if is_text => name_from_text(&html::visible_text(&canonical_html), &signature_id),
        None => name_from_html(&canonical_html, &signature_id),
    };

    debug!(
        "Parsed {} as {} ({:?} via {:?})",
        path.display(),
        payload_format,
        classification.class,
        classification.strategy
    );

    let rich_content = codec::html_to_rich(&canonical_html);
    let signature = Signature::new(
        signature_id,
        path,
        payload_format,
        display_name,
        canonical_html,
        rich_content,
    );
    Ok(match metadata {
        Some(entry) => signature.with_account(&entry.account_id),
        None => signature,
    })
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SignatureError::FormatUnrecognized {
            path: path.to_path_buf(),
            reason: "file name has no usable stem".to_string(),
        })
}

/// Guess a display name for HTML content.
pub fn name_from_html(html_content: &str, stem: &str) -> String {
    if let Some(title) = TITLE
        .captures(html_content)
        .map(|caps| html::visible_text(&caps[1]))
        .filter(|t| !t.is_empty())
    {
        return title;
    }

    for (tag, pattern) in NAME_SOURCES.iter() {
        let Some(caps) = pattern.captures(html_content) else {
            continue;
        };
        let mut text = html::visible_text(&caps[1]);
        if *tag == "body" {
            text = text
                .chars()
                .take(ParserConfig::BODY_SNIPPET_CHARS)
                .collect::<String>()
                .trim()
                .to_string();
        }
        if !text.is_empty() {
            return truncate_name(&text);
        }
    }

    // Bare fragments such as `<b>Jane</b><br>` have no enclosing element.
    let text: String = html::visible_text(html_content)
        .chars()
        .take(ParserConfig::BODY_SNIPPET_CHARS)
        .collect();
    match text.trim() {
        "" => fallback_name(stem),
        text => truncate_name(text),
    }
}

/// Guess a display name for plain text.
pub fn name_from_text(text: &str, stem: &str) -> String {
    let collapsed = html::collapse_whitespace(text);
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        fallback_name(stem)
    } else {
        truncate_name(trimmed)
    }
}

/// Cut `name` to the maximum length, marking the cut with an ellipsis.
pub fn truncate_name(name: &str) -> String {
    if name.chars().count() <= ParserConfig::NAME_MAX_CHARS {
        return name.to_string();
    }
    let mut truncated: String = name.chars().take(ParserConfig::NAME_MAX_CHARS).collect();
    truncated.push_str(ParserConfig::NAME_ELLIPSIS);
    truncated
}

fn fallback_name(stem: &str) -> String {
    format!("{}{}", ParserConfig::FILENAME_LABEL, stem)
}

/// Minimal HTML document for plain text: blank-line separated blocks become
/// paragraphs, single newlines become `<br>`.
pub fn wrap_plain_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut body = String::new();
    for block in BLANK_LINES.split(normalized.trim()) {
        body.push_str("<p>");
        body.push_str(&html::escape_text(block).replace('\n', "<br>"));
        body.push_str("</p>");
    }
    format!("<html><body>{}</body></html>", body)
}
