//! Vector-store abstraction.
//!
//! One collection per source PDF, one record per page. The [`VectorStore`]
//! trait covers the operations the ingest, backfill and synthesis passes
//! need; [`chroma::ChromaStore`] talks to a hosted Chroma instance and
//! [`memory::MemoryStore`] keeps everything in-process for tests.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`list_collections`](VectorStore::list_collections) | Names of every collection |
//! | [`collection_exists`](VectorStore::collection_exists) | Skip-if-exists check before upload |
//! | [`create_collection`](VectorStore::create_collection) | New empty collection |
//! | [`add`](VectorStore::add) | Append page records |
//! | [`get`](VectorStore::get) | Records, optionally filtered on one metadata key |
//! | [`update_metadata`](VectorStore::update_metadata) | Replace one record's metadata |
//! | [`query`](VectorStore::query) | Top-n records for a natural-language query |

pub mod chroma;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Metadata attached to a stored record.
pub type Metadata = Map<String, Value>;

/// One stored page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
}

/// A record returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub distance: Option<f32>,
}

/// Equality filter on a single metadata key.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: Value,
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Chroma `where` clause: `{"key": {"$eq": value}}`.
    pub fn to_where(&self) -> Value {
        let mut clause = Map::new();
        clause.insert(self.key.clone(), serde_json::json!({ "$eq": self.value }));
        Value::Object(clause)
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        match (metadata.get(&self.key), &self.value) {
            (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (Some(found), wanted) => found == wanted,
            (None, _) => false,
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.list_collections().await?.iter().any(|c| c == name))
    }

    async fn create_collection(&self, name: &str) -> Result<()>;

    async fn add(&self, collection: &str, records: &[StoreRecord]) -> Result<()>;

    async fn get(&self, collection: &str, filter: Option<&MetadataFilter>)
        -> Result<Vec<StoreRecord>>;

    /// Replace the metadata of record `id`. The document text is untouched.
    async fn update_metadata(&self, collection: &str, id: &str, metadata: &Metadata)
        -> Result<()>;

    async fn query(&self, collection: &str, text: &str, n_results: usize)
        -> Result<Vec<QueryHit>>;
}

/// Record id for page `page_number` of `collection`.
pub fn page_record_id(collection: &str, page_number: u32) -> String {
    format!("{}_page_{}", collection, page_number)
}

/// Collection name for a source PDF: its file name without the extension.
pub fn collection_name_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
