//! Metadata backfill for collections that are already uploaded.
//!
//! Page one of each collection is re-read, metadata is inferred from it, and
//! the result is merged into every record's stored metadata. Keys that the
//! inference does not produce are kept as they were.

use crate::error::Result;
use crate::llm::ChatModel;
use crate::metadata::{infer_metadata, parse_prefixed_lines, DocumentMetadata, MetadataSchema};
use crate::store::{MetadataFilter, VectorStore};
use serde_json::Value;
use tracing::{info, warn};

/// Where backfilled metadata comes from.
#[derive(Clone, Copy)]
pub enum MetadataSource<'a> {
    /// Ask the hosted model for the bibliographic keys.
    Model(&'a dyn ChatModel),
    /// Read `Key: value` lines straight from the page text.
    PrefixedLines,
}

impl MetadataSource<'_> {
    async fn infer(&self, text: &str) -> DocumentMetadata {
        match self {
            MetadataSource::Model(model) => {
                infer_metadata(*model, MetadataSchema::BIBLIOGRAPHIC, text).await
            }
            MetadataSource::PrefixedLines => parse_prefixed_lines(text),
        }
    }
}

/// What happened to one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Updated { records: usize },
    NoFirstPage,
    NoMetadata,
}

/// Outcome of a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub updated: Vec<String>,
    pub no_pages: Vec<String>,
    pub no_metadata: Vec<String>,
    pub failed: Vec<String>,
    pub records: usize,
}

/// Backfill every collection in `store`, continuing past failures.
pub async fn backfill_collections(
    store: &dyn VectorStore,
    source: MetadataSource<'_>,
) -> Result<BackfillSummary> {
    let collections = store.list_collections().await?;
    let total = collections.len();
    println!("Found {} collections to process", total);
    info!(count = total, "Starting metadata backfill");

    let mut summary = BackfillSummary::default();

    for (idx, name) in collections.into_iter().enumerate() {
        println!("\nProcessing collection '{}' ({}/{})", name, idx + 1, total);

        match backfill_collection(store, &source, &name).await {
            Ok(BackfillOutcome::Updated { records }) => {
                println!(
                    "✅ Successfully updated metadata for {} documents in collection '{}'",
                    records, name
                );
                summary.records += records;
                summary.updated.push(name);
            }
            Ok(BackfillOutcome::NoFirstPage) => {
                println!("No documents found in collection '{}'", name);
                summary.no_pages.push(name);
            }
            Ok(BackfillOutcome::NoMetadata) => {
                println!("No metadata found in first page of collection '{}'", name);
                info!(collection = %name, "No metadata found, skipping update");
                summary.no_metadata.push(name);
            }
            Err(e) => {
                println!("❌ Error processing collection '{}': {}", name, e);
                warn!(collection = %name, error = %e, "Backfill failed");
                summary.failed.push(name);
            }
        }
    }

    info!(
        updated = summary.updated.len(),
        no_pages = summary.no_pages.len(),
        no_metadata = summary.no_metadata.len(),
        failed = summary.failed.len(),
        records = summary.records,
        "Backfill complete"
    );
    Ok(summary)
}

pub async fn backfill_collection(
    store: &dyn VectorStore,
    source: &MetadataSource<'_>,
    collection: &str,
) -> Result<BackfillOutcome> {
    let first_pages = store
        .get(collection, Some(&MetadataFilter::eq("page_number", 1)))
        .await?;
    let Some(first) = first_pages.first() else {
        return Ok(BackfillOutcome::NoFirstPage);
    };

    let metadata = source.infer(&first.document).await;
    if metadata.is_empty() {
        return Ok(BackfillOutcome::NoMetadata);
    }

    let records = store.get(collection, None).await?;
    for record in &records {
        let mut merged = record.metadata.clone();
        for (key, value) in metadata.iter() {
            merged.insert(key.clone(), Value::from(value.clone()));
        }
        store.update_metadata(collection, &record.id, &merged).await?;
    }

    Ok(BackfillOutcome::Updated {
        records: records.len(),
    })
}
