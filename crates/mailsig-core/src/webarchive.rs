//! Web archive container codec.
//!
//! A web archive is a property list with a `WebMainResource` dictionary
//! (the HTML bytes plus MIME type, text encoding, frame name and URL) and a
//! `WebSubresources` array. Archives are read in either binary or XML form
//! and always written as binary.

use crate::config::WebArchiveConfig;
use crate::error::{Result, SignatureError};
use encoding_rs::{Encoding, UTF_8};
use plist::{Dictionary, Value};
use std::io::Cursor;
use std::path::Path;

/// Container keys.
mod keys {
    pub const MAIN_RESOURCE: &str = "WebMainResource";
    pub const SUBRESOURCES: &str = "WebSubresources";
    pub const DATA: &str = "WebResourceData";
    pub const FRAME_NAME: &str = "WebResourceFrameName";
    pub const MIME_TYPE: &str = "WebResourceMIMEType";
    pub const TEXT_ENCODING: &str = "WebResourceTextEncodingName";
    pub const URL: &str = "WebResourceURL";
}

/// The main resource record.
#[derive(Debug, Clone, PartialEq)]
pub struct WebResource {
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
    pub text_encoding: Option<String>,
    pub frame_name: Option<String>,
    pub url: Option<String>,
}

/// A parsed web archive.
#[derive(Debug, Clone, PartialEq)]
pub struct WebArchive {
    pub main_resource: WebResource,
    /// Number of sub-resources in the source archive (dropped on rebuild)
    pub subresource_count: usize,
}

impl WebArchive {
    /// Build a fresh archive around `html`.
    pub fn for_html(html: &str) -> Self {
        Self {
            main_resource: WebResource {
                data: html.as_bytes().to_vec(),
                mime_type: Some(WebArchiveConfig::MIME_TYPE.to_string()),
                text_encoding: Some(WebArchiveConfig::TEXT_ENCODING.to_string()),
                frame_name: Some(WebArchiveConfig::FRAME_NAME.to_string()),
                url: Some(WebArchiveConfig::PLACEHOLDER_URL.to_string()),
            },
            subresource_count: 0,
        }
    }

    /// Parse archive bytes. `path` is only used for error context.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        let unrecognized = |reason: String| SignatureError::FormatUnrecognized {
            path: path.to_path_buf(),
            reason,
        };

        let root = Value::from_reader(Cursor::new(bytes))
            .map_err(|e| unrecognized(format!("not a property list ({})", e)))?;
        let root = root
            .as_dictionary()
            .ok_or_else(|| unrecognized("archive root is not a dictionary".to_string()))?;
        let main = root
            .get(keys::MAIN_RESOURCE)
            .and_then(Value::as_dictionary)
            .ok_or_else(|| unrecognized(format!("missing {}", keys::MAIN_RESOURCE)))?;
        let data = main
            .get(keys::DATA)
            .and_then(Value::as_data)
            .ok_or_else(|| unrecognized(format!("main resource has no {}", keys::DATA)))?;

        let string_field = |key: &str| main.get(key).and_then(Value::as_string).map(str::to_string);
        let subresource_count = root
            .get(keys::SUBRESOURCES)
            .and_then(Value::as_array)
            .map_or(0, Vec::len);

        Ok(Self {
            main_resource: WebResource {
                data: data.to_vec(),
                mime_type: string_field(keys::MIME_TYPE),
                text_encoding: string_field(keys::TEXT_ENCODING),
                frame_name: string_field(keys::FRAME_NAME),
                url: string_field(keys::URL),
            },
            subresource_count,
        })
    }

    /// Read and parse the archive at `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| SignatureError::io_with_path(e, path))?;
        Self::from_bytes(&bytes, path)
    }

    /// Decode the main resource as text using its declared encoding.
    pub fn html(&self, path: &Path) -> Result<String> {
        decode_text(
            &self.main_resource.data,
            self.main_resource.text_encoding.as_deref(),
            path,
        )
    }

    /// Serialize as a binary property list with an empty sub-resource list.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let resource = &self.main_resource;
        let mut main = Dictionary::new();
        main.insert(keys::DATA.to_string(), Value::Data(resource.data.clone()));
        let fields = [
            (keys::FRAME_NAME, &resource.frame_name),
            (keys::MIME_TYPE, &resource.mime_type),
            (keys::TEXT_ENCODING, &resource.text_encoding),
            (keys::URL, &resource.url),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                main.insert(key.to_string(), Value::String(value.clone()));
            }
        }

        let mut root = Dictionary::new();
        root.insert(keys::MAIN_RESOURCE.to_string(), Value::Dictionary(main));
        root.insert(keys::SUBRESOURCES.to_string(), Value::Array(Vec::new()));

        let mut buffer = Vec::new();
        Value::Dictionary(root).to_writer_binary(&mut buffer)?;
        Ok(buffer)
    }
}

/// Decode `bytes` using the archive's declared text encoding label.
///
/// A byte order mark overrides the label; no label means UTF-8. Unknown
/// labels and malformed bytes fail rather than decoding with replacements.
pub fn decode_text(bytes: &[u8], encoding: Option<&str>, path: &Path) -> Result<String> {
    let failed = |message: String| SignatureError::ContentDecodeFailed {
        path: path.to_path_buf(),
        message,
    };

    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => {
            let label = encoding.map(|e| e.trim().trim_matches('"')).unwrap_or("");
            let encoding = if label.is_empty() {
                UTF_8
            } else {
                Encoding::for_label(label.as_bytes())
                    .ok_or_else(|| failed(format!("unknown text encoding '{}'", label)))?
            };
            (encoding, bytes)
        }
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
        .ok_or_else(|| failed(format!("malformed {} data", encoding.name())))
}
