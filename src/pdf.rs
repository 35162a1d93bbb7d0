//! Per-page PDF text extraction.

use crate::error::Result;
use lopdf::Document;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Metadata stored alongside each page.
///
/// Document-level fields (Title, Author, ...) live in `extra` and are
/// flattened into the same map when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub page_number: u32,
    pub word_count: usize,
    pub source_file: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl PageMetadata {
    /// JSON object form, as stored in a collection.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("page_number".to_string(), Value::from(self.page_number));
        map.insert("word_count".to_string(), Value::from(self.word_count));
        map.insert("source_file".to_string(), Value::from(self.source_file.clone()));
        for (key, value) in &self.extra {
            map.insert(key.clone(), Value::from(value.clone()));
        }
        map
    }
}

/// One page's text and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfPageRecord {
    pub text: String,
    pub metadata: PageMetadata,
}

impl PdfPageRecord {
    pub fn new(text: String, page_number: u32, source_file: &str) -> Self {
        let word_count = text.split_whitespace().count();
        Self {
            text,
            metadata: PageMetadata {
                page_number,
                word_count,
                source_file: source_file.to_string(),
                extra: BTreeMap::new(),
            },
        }
    }

    /// Merge document-level fields into this page's metadata.
    pub fn merge_fields<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in fields {
            self.metadata.extra.insert(key.clone(), value.clone());
        }
    }
}

/// Extract every page of the PDF at `path`, in page order.
///
/// Text extraction is best effort: a page whose content cannot be decoded
/// (scanned images, exotic fonts) yields an empty string.
///
/// # Errors
///
/// Returns `ScholarError::Pdf` when the file is not a loadable PDF.
pub fn extract_pages(path: &Path) -> Result<Vec<PdfPageRecord>> {
    let document = Document::load(path)?;
    let source_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let pages = document.get_pages();
    debug!(file = %source_file, pages = pages.len(), "Loaded PDF");

    let records = pages
        .keys()
        .enumerate()
        .map(|(idx, &page_no)| {
            let text = document.extract_text(&[page_no]).unwrap_or_else(|e| {
                warn!(file = %source_file, page = page_no, error = %e, "No text extracted");
                String::new()
            });
            PdfPageRecord::new(text, idx as u32 + 1, &source_file)
        })
        .collect();

    Ok(records)
}
