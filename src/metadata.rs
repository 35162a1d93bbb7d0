//! Document-level metadata inference.
//!
//! One routine serves both the ingester and the backfill: ask the model for a
//! JSON object with a fixed key set, and when the answer is not valid JSON
//! fall back to scanning its lines for `Key: value` pairs.

use crate::llm::{extract_json, ChatModel};
use crate::prompts::build_metadata_prompt;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// The key set a metadata request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataSchema {
    pub keys: &'static [&'static str],
}

impl MetadataSchema {
    /// Used at ingest time.
    pub const FULL: MetadataSchema = MetadataSchema {
        keys: &["Title", "Author", "Publication", "Year", "Publisher", "Abstract"],
    };

    /// Used by the backfill pass.
    pub const BIBLIOGRAPHIC: MetadataSchema = MetadataSchema {
        keys: &["Title", "Author", "Publication", "Year", "Publisher"],
    };

    /// Metadata with every key present and empty.
    pub fn empty(&self) -> DocumentMetadata {
        DocumentMetadata {
            fields: self
                .keys
                .iter()
                .map(|k| (k.to_string(), String::new()))
                .collect(),
        }
    }
}

/// Ordered key/value metadata for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub fields: BTreeMap<String, String>,
}

impl DocumentMetadata {
    /// True when no key carries a value.
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|v| v.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields.iter()
    }
}

/// Parse a model answer into `schema`'s keys.
pub fn parse_structured(response: &str, schema: MetadataSchema) -> DocumentMetadata {
    match serde_json::from_str::<Value>(&extract_json(response)) {
        Ok(Value::Object(map)) => {
            let mut metadata = schema.empty();
            for (key, slot) in metadata.fields.iter_mut() {
                *slot = match map.get(key) {
                    Some(Value::String(s)) => s.trim().to_string(),
                    Some(Value::Null) | None => String::new(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(scalar_to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                    Some(other) => scalar_to_string(other),
                };
            }
            metadata
        }
        _ => {
            debug!("Model answer is not a JSON object, scanning lines");
            scan_lines(response, schema)
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// For each line, the first schema key it mentions takes the text after the
/// first colon.
fn scan_lines(response: &str, schema: MetadataSchema) -> DocumentMetadata {
    let mut metadata = schema.empty();
    for line in response.lines() {
        let Some(key) = schema.keys.iter().find(|k| line.contains(**k)) else {
            continue;
        };
        let Some((_, value)) = line.split_once(':') else {
            continue;
        };
        let value = value
            .trim()
            .trim_end_matches(',')
            .trim()
            .trim_matches('"')
            .to_string();
        metadata.fields.insert(key.to_string(), value);
    }
    metadata
}

/// Ask `model` for `schema`'s keys from `text`. Never fails: a model error is
/// logged and yields empty metadata.
pub async fn infer_metadata(
    model: &dyn ChatModel,
    schema: MetadataSchema,
    text: &str,
) -> DocumentMetadata {
    let prompt = build_metadata_prompt(schema.keys, text);
    match model.complete(&prompt).await {
        Ok(response) => parse_structured(&response, schema),
        Err(e) => {
            println!("Error extracting metadata with LLM: {}", e);
            warn!(error = %e, "Metadata inference failed");
            schema.empty()
        }
    }
}

/// Prefix-based parser: picks up `Publication:`, `Year:`, `Publisher:`,
/// `Title:` and `Author:` lines, case-insensitively. Later lines win.
pub fn parse_prefixed_lines(text: &str) -> DocumentMetadata {
    const PREFIXES: &[(&str, &str)] = &[
        ("publication:", "Publication"),
        ("year:", "Year"),
        ("publisher:", "Publisher"),
        ("title:", "Title"),
        ("author:", "Author"),
    ];

    let mut metadata = MetadataSchema::BIBLIOGRAPHIC.empty();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let lower = line.to_lowercase();
        if let Some((_, key)) = PREFIXES.iter().find(|(p, _)| lower.starts_with(p)) {
            if let Some((_, value)) = line.split_once(':') {
                metadata.fields.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    metadata
}
