//! The signature record.

use crate::codec;
use crate::format::SignatureFormat;
use crate::rich::RichContent;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One signature, as loaded from (or about to be written to) its payload file.
///
/// Identity, location and format are fixed once the record exists. The two
/// content views only change together through the repository, which decides
/// which one is derived from the other.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signature {
    signature_id: String,
    storage_path: PathBuf,
    format: SignatureFormat,
    display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<String>,
    rich_content: RichContent,
    canonical_html: String,
    dirty: bool,
    #[serde(skip)]
    renamed: bool,
}

impl Signature {
    pub(crate) fn new(
        signature_id: impl Into<String>,
        storage_path: impl Into<PathBuf>,
        format: SignatureFormat,
        display_name: impl Into<String>,
        canonical_html: impl Into<String>,
        rich_content: RichContent,
    ) -> Self {
        Self {
            signature_id: signature_id.into(),
            storage_path: storage_path.into(),
            format,
            display_name: display_name.into(),
            account_id: None,
            rich_content,
            canonical_html: canonical_html.into(),
            dirty: false,
            renamed: false,
        }
    }

    pub(crate) fn with_account(mut self, account_id: impl Into<String>) -> Self {
        let account_id = account_id.into();
        self.account_id = (!account_id.is_empty()).then_some(account_id);
        self
    }

    pub fn signature_id(&self) -> &str {
        &self.signature_id
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn format(&self) -> SignatureFormat {
        self.format
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Catalog account the signature was listed under, if any.
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn rich_content(&self) -> &RichContent {
        &self.rich_content
    }

    pub fn canonical_html(&self) -> &str {
        &self.canonical_html
    }

    /// Has in-memory changes not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Display name changed since the last save; the catalog still has the old one.
    pub fn is_renamed(&self) -> bool {
        self.renamed
    }

    pub(crate) fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }

    pub(crate) fn mark_renamed(&mut self) {
        self.renamed = true;
    }

    pub(crate) fn set_content(&mut self, rich_content: RichContent, canonical_html: String) {
        self.rich_content = rich_content;
        self.canonical_html = canonical_html;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
        self.renamed = false;
    }
}

/// Content handed over by an editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureContent {
    /// From the HTML editor; rich content is derived from it
    Html(String),
    /// From the rich-text editor; canonical HTML is derived from it
    Rich(RichContent),
    /// Both views supplied together, stored as given
    Both { rich: RichContent, html: String },
}

impl SignatureContent {
    /// Resolve into `(rich_content, canonical_html)`.
    pub fn into_views(self) -> (RichContent, String) {
        match self {
            SignatureContent::Html(html) => (codec::html_to_rich(&html), html),
            SignatureContent::Rich(rich) => {
                let html = codec::rich_to_html(&rich);
                (rich, html)
            }
            SignatureContent::Both { rich, html } => (rich, html),
        }
    }
}
