//! Conversion between canonical HTML and [`RichContent`].
//!
//! Visible text survives a round trip through both directions; styling is
//! carried on a best-effort basis. Non-breaking spaces are read back as
//! ordinary spaces.

use crate::html::{self, Token};
use crate::rich::{Block, BlockKind, RichContent, RunStyle, TextRun};
use tracing::warn;

/// Tags that open and close a block.
fn block_kind_for(tag: &str) -> Option<Option<BlockKind>> {
    match tag {
        "p" | "div" | "tr" => Some(None),
        "li" => Some(Some(BlockKind::ListItem)),
        "blockquote" => Some(Some(BlockKind::Quote)),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag[1..].parse().unwrap_or(1);
            Some(Some(BlockKind::Heading(level)))
        }
        _ => None,
    }
}

/// Tags that end the current block without starting one of their own.
fn is_container(tag: &str) -> bool {
    matches!(
        tag,
        "ul" | "ol" | "table" | "thead" | "tbody" | "tfoot" | "body" | "hr"
    )
}

/// Parse HTML into rich content.
pub fn html_to_rich(html: &str) -> RichContent {
    let mut reader = RichReader::default();
    for token in html::tokenize(html) {
        match token {
            Token::Text(text) => reader.text(text),
            Token::Start {
                name,
                attrs,
                self_closing,
            } => reader.start(&name, attrs, self_closing),
            Token::End { name } => reader.end(&name),
        }
    }
    reader.finish()
}

#[derive(Default)]
struct RichReader {
    blocks: Vec<Block>,
    current: Block,
    /// Open block elements: tag, kind, and block count when opened
    block_stack: Vec<(String, BlockKind, usize)>,
    /// Open inline style elements and the style in effect inside them
    style_stack: Vec<(String, RunStyle)>,
    hidden_depth: usize,
    /// The last appended text ended in a collapsible space
    trailing_space: bool,
    /// The last thing appended was a line break
    after_break: bool,
}

impl RichReader {
    fn style(&self) -> RunStyle {
        self.style_stack
            .last()
            .map(|(_, style)| style.clone())
            .unwrap_or_default()
    }

    fn kind(&self) -> BlockKind {
        self.block_stack
            .last()
            .map(|(_, kind, _)| *kind)
            .unwrap_or_default()
    }

    fn at_collapse_point(&self) -> bool {
        self.current.runs.is_empty() || self.trailing_space || self.after_break
    }

    fn text(&mut self, raw: &str) {
        if self.hidden_depth > 0 {
            return;
        }
        let collapsed = html::collapse_whitespace(raw);
        let mut text: &str = &collapsed;
        if self.at_collapse_point() {
            text = text.strip_prefix(' ').unwrap_or(text);
        }
        if text.is_empty() {
            return;
        }

        let decoded = html::decode_entities(text).replace('\u{a0}', " ");
        self.trailing_space = text.ends_with(' ');
        self.after_break = false;
        let style = self.style();
        self.current.push_run(TextRun::styled(decoded, style));
    }

    fn line_break(&mut self) {
        let style = self.style();
        self.current.push_run(TextRun::styled("\n", style));
        self.trailing_space = false;
        self.after_break = true;
    }

    fn start(&mut self, name: &str, attrs: &str, self_closing: bool) {
        if html::is_hidden_element(name) {
            if !self_closing {
                self.hidden_depth += 1;
            }
            return;
        }
        if self.hidden_depth > 0 {
            return;
        }

        if name == "br" {
            self.line_break();
        } else if let Some(kind) = block_kind_for(name) {
            self.flush(false);
            if !self_closing {
                let kind = kind.unwrap_or_else(|| self.kind());
                self.block_stack
                    .push((name.to_string(), kind, self.blocks.len()));
            }
        } else if is_container(name) {
            self.flush(false);
        } else if matches!(name, "td" | "th") {
            if !self.at_collapse_point() {
                self.text(" ");
            }
        } else if !self_closing {
            if let Some(style) = apply_inline(name, attrs, self.style()) {
                self.style_stack.push((name.to_string(), style));
            }
        }
    }

    fn end(&mut self, name: &str) {
        if html::is_hidden_element(name) {
            self.hidden_depth = self.hidden_depth.saturating_sub(1);
            return;
        }
        if self.hidden_depth > 0 {
            return;
        }

        if block_kind_for(name).is_some() {
            let Some(index) = self.block_stack.iter().rposition(|(tag, _, _)| tag == name) else {
                return;
            };
            let opened_at = self.block_stack[index].2;
            // An element that produced no block of its own still counts as one line.
            self.flush(self.blocks.len() == opened_at);
            self.block_stack.truncate(index);
        } else if is_container(name) {
            self.flush(false);
        } else if let Some(index) = self.style_stack.iter().rposition(|(tag, _)| tag == name) {
            self.style_stack.truncate(index);
        }
    }

    /// Close the current block. Empty blocks are kept only when `keep_empty`.
    fn flush(&mut self, keep_empty: bool) {
        let mut block = std::mem::take(&mut self.current);
        block.kind = self.kind();

        if self.trailing_space {
            trim_last_char(&mut block, ' ');
        }
        // A trailing line break does not render a line of its own.
        if self.after_break {
            trim_last_char(&mut block, '\n');
        }
        self.trailing_space = false;
        self.after_break = false;

        if !block.runs.is_empty() || keep_empty {
            self.blocks.push(block);
        }
    }

    fn finish(mut self) -> RichContent {
        self.flush(false);
        RichContent::new(self.blocks)
    }
}

fn trim_last_char(block: &mut Block, c: char) {
    if let Some(last) = block.runs.last_mut() {
        if last.text.ends_with(c) {
            last.text.pop();
        }
        if last.text.is_empty() {
            block.runs.pop();
        }
    }
}

/// The style in effect inside an inline element, or `None` if the element
/// carries no style.
fn apply_inline(name: &str, attrs: &str, mut style: RunStyle) -> Option<RunStyle> {
    match name {
        "b" | "strong" => style.bold = true,
        "i" | "em" => style.italic = true,
        "u" => style.underline = true,
        "s" | "strike" | "del" => style.strikethrough = true,
        "a" => {
            if let Some(href) = html::attribute(attrs, "href") {
                style.link = Some(href);
            }
        }
        "font" => {
            if let Some(color) = html::attribute(attrs, "color") {
                style.color = Some(color);
            }
            if let Some(face) = html::attribute(attrs, "face") {
                style.font_family = Some(face);
            }
            if let Some(size) = html::attribute(attrs, "size") {
                style.font_size = Some(size);
            }
        }
        "span" => {}
        _ => return None,
    }
    if let Some(css) = html::attribute(attrs, "style") {
        apply_css(&css, &mut style);
    }
    Some(style)
}

fn apply_css(css: &str, style: &mut RunStyle) {
    for declaration in css.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let property = property.trim().to_ascii_lowercase();
        let value = value.trim();
        let lowered = value.to_ascii_lowercase();
        match property.as_str() {
            "font-weight" => {
                style.bold = lowered == "bold"
                    || lowered == "bolder"
                    || lowered.parse::<u16>().is_ok_and(|w| w >= 600)
            }
            "font-style" => style.italic = lowered == "italic" || lowered == "oblique",
            "text-decoration" | "text-decoration-line" => {
                if lowered.contains("underline") {
                    style.underline = true;
                }
                if lowered.contains("line-through") {
                    style.strikethrough = true;
                }
            }
            "color" => style.color = Some(value.to_string()),
            "font-family" => style.font_family = Some(value.to_string()),
            "font-size" => style.font_size = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Render rich content as a UTF-8 HTML document.
pub fn rich_to_html(rich: &RichContent) -> String {
    let mut out = String::from("<html><head><meta charset=\"utf-8\"></head><body>");
    let mut in_list = false;

    for block in &rich.blocks {
        let is_item = block.kind == BlockKind::ListItem;
        if is_item && !in_list {
            out.push_str("<ul>");
        } else if !is_item && in_list {
            out.push_str("</ul>");
        }
        in_list = is_item;

        let tag = block_tag(block.kind);
        out.push('<');
        out.push_str(&tag);
        out.push('>');
        write_block_body(block, &mut out);
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }
    if in_list {
        out.push_str("</ul>");
    }

    out.push_str("</body></html>");
    out
}

fn block_tag(kind: BlockKind) -> String {
    match kind {
        BlockKind::Paragraph => "p".to_string(),
        BlockKind::Heading(level) => format!("h{}", level.clamp(1, 6)),
        BlockKind::ListItem => "li".to_string(),
        BlockKind::Quote => "blockquote".to_string(),
    }
}

fn write_block_body(block: &Block, out: &mut String) {
    let chars: Vec<char> = block.runs.iter().flat_map(|r| r.text.chars()).collect();
    let protect = protected_spaces(&chars);

    let mut index = 0;
    for run in &block.runs {
        let count = run.text.chars().count();
        let mut body = String::new();
        for (offset, c) in run.text.chars().enumerate() {
            match c {
                '\n' => body.push_str("<br>"),
                ' ' if protect[index + offset] => body.push_str("&nbsp;"),
                c if c.is_ascii_whitespace() && c != ' ' => {
                    body.push_str(&format!("&#{};", c as u32))
                }
                '&' => body.push_str("&amp;"),
                '<' => body.push_str("&lt;"),
                '>' => body.push_str("&gt;"),
                c => body.push(c),
            }
        }
        index += count;
        write_styled(&run.style, &body, out);
    }

    // Keep an empty line or a final line break visible.
    if chars.last().map_or(true, |c| *c == '\n') {
        out.push_str("<br>");
    }
}

/// Spaces that HTML would collapse or drop and must be written as `&nbsp;`.
fn protected_spaces(chars: &[char]) -> Vec<bool> {
    (0..chars.len())
        .map(|i| {
            chars[i] == ' '
                && (i == 0
                    || chars[i - 1] == ' '
                    || chars[i - 1] == '\n'
                    || i + 1 == chars.len()
                    || chars[i + 1] == '\n')
        })
        .collect()
}

fn write_styled(style: &RunStyle, body: &str, out: &mut String) {
    let mut closers: Vec<&str> = Vec::new();
    if let Some(link) = &style.link {
        out.push_str(&format!("<a href=\"{}\">", html::escape_attribute(link)));
        closers.push("</a>");
    }
    for (on, open, close) in [
        (style.bold, "<b>", "</b>"),
        (style.italic, "<i>", "</i>"),
        (style.underline, "<u>", "</u>"),
        (style.strikethrough, "<s>", "</s>"),
    ] {
        if on {
            out.push_str(open);
            closers.push(close);
        }
    }
    if style.has_css() {
        let mut css = Vec::new();
        if let Some(color) = &style.color {
            css.push(format!("color: {}", color));
        }
        if let Some(family) = &style.font_family {
            css.push(format!("font-family: {}", family));
        }
        if let Some(size) = &style.font_size {
            css.push(format!("font-size: {}", size));
        }
        out.push_str(&format!(
            "<span style=\"{}\">",
            html::escape_attribute(&css.join("; "))
        ));
        closers.push("</span>");
    }

    out.push_str(body);
    for close in closers.iter().rev() {
        out.push_str(close);
    }
}

/// HTML chosen for writing plus whether the two views disagreed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub html: String,
    pub diverged: bool,
}

/// Pick the HTML to persist.
///
/// `regenerated` comes from [`rich_to_html`]; `canonical` is the last HTML
/// captured directly. When both exist and differ, `canonical` is written
/// and `regenerated` is discarded.
pub fn reconcile(regenerated: &str, canonical: Option<&str>) -> Reconciled {
    match canonical {
        Some(canonical) if !canonical.is_empty() => {
            let diverged = regenerated != canonical;
            if diverged {
                warn!(
                    "Regenerated HTML ({} bytes) differs from canonical HTML ({} bytes), keeping canonical",
                    regenerated.len(),
                    canonical.len()
                );
            }
            Reconciled {
                html: canonical.to_string(),
                diverged,
            }
        }
        _ => Reconciled {
            html: regenerated.to_string(),
            diverged: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold() -> RunStyle {
        RunStyle {
            bold: true,
            ..Default::default()
        }
    }

    fn assert_round_trip(rich: RichContent) {
        let html = rich_to_html(&rich);
        let back = html_to_rich(&html);
        assert_eq!(back.plain_text(), rich.plain_text(), "html was {}", html);
    }

    #[test]
    fn test_simple_document() {
        let rich = html_to_rich("<html><body>Hi</body></html>");
        assert_eq!(rich.plain_text(), "Hi");
        assert_eq!(rich.blocks.len(), 1);
    }

    #[test]
    fn test_whitespace_collapses() {
        let rich = html_to_rich("<div>\n  Jane   Doe\n</div>\n<div>Acme <b>Corp</b> </div>");
        assert_eq!(rich.plain_text(), "Jane Doe\nAcme Corp");
    }

    #[test]
    fn test_hidden_content_is_skipped() {
        let rich = html_to_rich(
            "<html><head><title>Name</title><style>p { color: red }</style></head>\
             <body><script>x()</script><p>Visible</p></body></html>",
        );
        assert_eq!(rich.plain_text(), "Visible");
    }

    #[test]
    fn test_styles_and_links() {
        let rich = html_to_rich(
            "<p><b>Jane</b> <a href=\"mailto:j@example.com\">mail</a> \
             <span style=\"color: #333; font-style: italic\">x</span></p>",
        );
        let runs = &rich.blocks[0].runs;
        assert_eq!(runs[0].text, "Jane");
        assert!(runs[0].style.bold);
        let link = runs.iter().find(|r| r.text == "mail").unwrap();
        assert_eq!(link.style.link.as_deref(), Some("mailto:j@example.com"));
        let span = runs.iter().find(|r| r.text == "x").unwrap();
        assert_eq!(span.style.color.as_deref(), Some("#333"));
        assert!(span.style.italic);
    }

    #[test]
    fn test_block_kinds() {
        let rich = html_to_rich(
            "<h2>Title</h2><ul><li>one</li><li>two</li></ul><blockquote><p>q</p></blockquote>",
        );
        let kinds: Vec<BlockKind> = rich.blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading(2),
                BlockKind::ListItem,
                BlockKind::ListItem,
                BlockKind::Quote
            ]
        );
    }

    #[test]
    fn test_line_breaks_and_empty_paragraphs() {
        let rich = html_to_rich("<p>a<br>b</p><p><br></p><p>c</p>");
        assert_eq!(rich.plain_text(), "a\nb\n\nc");
    }

    #[test]
    fn test_round_trip_preserves_text() {
        assert_round_trip(RichContent::from_plain_text("Jane Doe\nAcme & Sons <ltd>"));
        assert_round_trip(RichContent::from_plain_text("  indented\n\ntrailing  \n"));
        assert_round_trip(RichContent::from_plain_text("tab\there\r\nx"));
        assert_round_trip(RichContent::default());
        assert_round_trip(RichContent::new(vec![
            Block {
                kind: BlockKind::Heading(1),
                runs: vec![
                    TextRun::styled("Bold ", bold()),
                    TextRun::plain(" spaced"),
                ],
            },
            Block::with_kind(BlockKind::ListItem, "item\n"),
            Block::with_kind(BlockKind::Quote, "\n"),
            Block::paragraph(""),
        ]));
    }

    #[test]
    fn test_rich_to_html_escapes() {
        let html = rich_to_html(&RichContent::from_plain_text("a < b"));
        assert!(html.contains("a &lt; b"));
        assert!(html.starts_with("<html>"));
    }

    #[test]
    fn test_reconcile_prefers_canonical() {
        let result = reconcile("<p>new</p>", Some("<p>old</p>"));
        assert!(result.diverged);
        assert_eq!(result.html, "<p>old</p>");

        let result = reconcile("<p>same</p>", Some("<p>same</p>"));
        assert!(!result.diverged);

        let result = reconcile("<p>new</p>", None);
        assert_eq!(result.html, "<p>new</p>");
        assert!(!result.diverged);
    }
}
