//! Structured rich-text representation of a signature.
//!
//! A document is an ordered list of blocks; each block holds styled text
//! runs. Line breaks inside a block are `\n` in run text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RichContent {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl RichContent {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// One unstyled paragraph per line of `text`.
    pub fn from_plain_text(text: &str) -> Self {
        Self {
            blocks: text.split('\n').map(Block::paragraph).collect(),
        }
    }

    /// Block texts joined with `\n`.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.runs.iter().all(|r| r.text.is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    #[default]
    Paragraph,
    /// Level 1 through 6
    Heading(u8),
    ListItem,
    Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    #[serde(default)]
    pub kind: BlockKind,
    #[serde(default)]
    pub runs: Vec<TextRun>,
}

impl Block {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::with_kind(BlockKind::Paragraph, text)
    }

    pub fn with_kind(kind: BlockKind, text: impl Into<String>) -> Self {
        let text = text.into();
        let runs = if text.is_empty() {
            Vec::new()
        } else {
            vec![TextRun::plain(text)]
        };
        Self { kind, runs }
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Append a run, merging it into the last run when the styles match.
    pub fn push_run(&mut self, run: TextRun) {
        if run.text.is_empty() {
            return;
        }
        match self.runs.last_mut() {
            Some(last) if last.style == run.style => last.text.push_str(&run.text),
            _ => self.runs.push(run),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub style: RunStyle,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: RunStyle::default(),
        }
    }

    pub fn styled(text: impl Into<String>, style: RunStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl RunStyle {
    pub fn is_plain(&self) -> bool {
        *self == RunStyle::default()
    }

    /// Whether any `<span style>` property is set.
    pub fn has_css(&self) -> bool {
        self.color.is_some() || self.font_family.is_some() || self.font_size.is_some()
    }
}
