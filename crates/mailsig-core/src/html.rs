//! Minimal HTML scanning helpers.
//!
//! Signatures are small, mostly machine-written HTML fragments. A forgiving
//! tag/text scanner is enough to read them; there is no DOM and no attempt
//! at standards-conformant tree construction.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// `name="value"`, `name='value'`, `name=value` or a bare `name`.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .unwrap()
});

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6}|[A-Za-z]{2,8});").unwrap());

static ASCII_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\n\r\x0C]+").unwrap());

/// A lexical HTML token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Start {
        /// Lower-cased tag name
        name: String,
        /// Raw attribute source
        attrs: &'a str,
        self_closing: bool,
    },
    End {
        name: String,
    },
}

/// Split `html` into text and tag tokens.
///
/// Comments, doctypes and processing instructions are dropped. A `<` that
/// doesn't open a tag is kept as text.
pub fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = html.as_bytes();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }

        let rest = &html[pos..];
        let scanned = if rest.starts_with("<!--") {
            Some((None, rest.find("-->").map_or(rest.len(), |end| end + 3)))
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            Some((None, rest.find('>').map_or(rest.len(), |end| end + 1)))
        } else {
            scan_tag(rest).map(|(token, len)| (Some(token), len))
        };

        match scanned {
            Some((token, len)) => {
                flush_text(html, text_start, pos, &mut tokens);
                tokens.extend(token);
                pos += len;
                text_start = pos;
            }
            None => pos += 1,
        }
    }
    flush_text(html, text_start, bytes.len(), &mut tokens);
    tokens
}

fn flush_text<'a>(html: &'a str, start: usize, end: usize, tokens: &mut Vec<Token<'a>>) {
    if start < end {
        tokens.push(Token::Text(&html[start..end]));
    }
}

/// Scan a start or end tag at the beginning of `rest`.
fn scan_tag(rest: &str) -> Option<(Token<'_>, usize)> {
    let is_end = rest[1..].starts_with('/');
    let name_start = if is_end { 2 } else { 1 };
    let name_len = rest[name_start..]
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    if name_len == 0 || !rest.as_bytes()[name_start].is_ascii_alphabetic() {
        return None;
    }
    let name = rest[name_start..name_start + name_len].to_ascii_lowercase();

    // Find the closing '>' outside of quoted attribute values.
    let body_start = name_start + name_len;
    let mut quote: Option<u8> = None;
    let mut close = None;
    for (offset, b) in rest.as_bytes()[body_start..].iter().enumerate() {
        match (quote, *b) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(*b),
            (None, b'>') => {
                close = Some(body_start + offset);
                break;
            }
            _ => {}
        }
    }
    let close = close?;
    let attrs = rest[body_start..close].trim();

    let token = if is_end {
        Token::End { name }
    } else {
        let self_closing = attrs.ends_with('/');
        Token::Start {
            name,
            attrs: attrs.trim_end_matches('/').trim_end(),
            self_closing,
        }
    };
    Some((token, close + 1))
}

/// Value of attribute `name` in a raw attribute string, entity-decoded.
pub fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTRIBUTE.captures_iter(attrs).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        Some(decode_entities(value).into_owned())
    })
}

/// Decode named (`amp lt gt quot apos nbsp`) and numeric character references.
///
/// Unknown references are left untouched.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let body = &caps[1];
        let decoded = match body {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ if body.starts_with("#x") || body.starts_with("#X") => {
                u32::from_str_radix(&body[2..], 16).ok().and_then(char::from_u32)
            }
            _ if body.starts_with('#') => body[1..].parse::<u32>().ok().and_then(char::from_u32),
            _ => None,
        };
        decoded.map_or_else(|| caps[0].to_string(), String::from)
    })
}

/// Escape text content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape an attribute value for use inside double quotes.
pub fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Collapse runs of ASCII whitespace into single spaces.
pub fn collapse_whitespace(text: &str) -> Cow<'_, str> {
    ASCII_WHITESPACE.replace_all(text, " ")
}

/// Visible text of an HTML fragment: tags removed, `head`/`style`/`script`
/// content skipped, entities decoded, whitespace collapsed and trimmed.
pub fn visible_text(html: &str) -> String {
    let mut out = String::new();
    let mut skip_depth = 0usize;
    for token in tokenize(html) {
        match token {
            Token::Start {
                name, self_closing, ..
            } if is_hidden_element(&name) && !self_closing => skip_depth += 1,
            Token::End { name } if is_hidden_element(&name) => {
                skip_depth = skip_depth.saturating_sub(1)
            }
            Token::Start { name, .. } if name == "br" => out.push(' '),
            Token::Text(text) if skip_depth == 0 => out.push_str(&decode_entities(text)),
            // Block boundaries separate words.
            Token::Start { .. } | Token::End { .. } => out.push(' '),
            Token::Text(_) => {}
        }
    }
    collapse_whitespace(&out.replace('\u{a0}', " ")).trim().to_string()
}

/// Elements whose content is never rendered as text.
pub fn is_hidden_element(name: &str) -> bool {
    matches!(name, "head" | "style" | "script" | "title")
}
