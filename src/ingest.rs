//! PDF ingestion into per-document collections.
//!
//! A collection that already exists is taken to be fully uploaded and the
//! document is skipped. Nothing detects a collection left half-filled by an
//! earlier failed run.

use crate::error::{Result, ScholarError};
use crate::llm::ChatModel;
use crate::metadata::{infer_metadata, MetadataSchema};
use crate::parser::list_files_with_extension;
use crate::pdf::{extract_pages, PdfPageRecord};
use crate::store::{collection_name_for, page_record_id, StoreRecord, VectorStore};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Uploaded { collection: String, pages: usize },
    SkippedExisting { collection: String },
    Empty,
}

/// Outcome of an ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub uploaded: Vec<String>,
    pub skipped_existing: Vec<String>,
    pub empty: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub pages: usize,
}

pub struct Ingester<'a> {
    store: &'a dyn VectorStore,
    model: Option<&'a dyn ChatModel>,
}

impl<'a> Ingester<'a> {
    /// With `model` set to `None`, pages carry only their own statistics.
    pub fn new(store: &'a dyn VectorStore, model: Option<&'a dyn ChatModel>) -> Self {
        Self { store, model }
    }

    /// Ingest every `*.pdf` in `dir`, continuing past per-document failures.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestSummary> {
        let files = list_files_with_extension(dir, "pdf")?;
        let total = files.len();
        println!("Found {} PDF files to process", total);
        info!(count = total, dir = %dir.display(), "Starting ingest");

        let mut summary = IngestSummary::default();

        for (idx, path) in files.into_iter().enumerate() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("\nProcessing {} ({}/{})", name, idx + 1, total);

            match self.ingest_file(&path).await {
                Ok(IngestOutcome::Uploaded { collection, pages }) => {
                    println!(
                        "✅ Successfully uploaded {} pages to new collection '{}'",
                        pages, collection
                    );
                    summary.pages += pages;
                    summary.uploaded.push(collection);
                }
                Ok(IngestOutcome::SkippedExisting { collection }) => {
                    println!("Collection '{}' already exists. Skipping...", collection);
                    summary.skipped_existing.push(collection);
                }
                Ok(IngestOutcome::Empty) => {
                    println!("No pages extracted from {}", name);
                    summary.empty.push(path);
                }
                Err(e) => {
                    println!("❌ Error uploading {}: {}", name, e);
                    warn!(file = %name, error = %e, "Ingest failed");
                    summary.failed.push(path);
                }
            }
        }

        info!(
            uploaded = summary.uploaded.len(),
            skipped = summary.skipped_existing.len(),
            empty = summary.empty.len(),
            failed = summary.failed.len(),
            pages = summary.pages,
            "Ingest complete"
        );
        Ok(summary)
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome> {
        let mut pages = match extract_pages(path) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Could not read PDF");
                Vec::new()
            }
        };
        if pages.is_empty() {
            return Ok(IngestOutcome::Empty);
        }

        let collection = collection_name_for(path).ok_or_else(|| {
            ScholarError::Parse(format!("No collection name for {}", path.display()))
        })?;

        if self.store.collection_exists(&collection).await? {
            return Ok(IngestOutcome::SkippedExisting { collection });
        }

        if let Some(model) = self.model {
            let metadata = infer_metadata(model, MetadataSchema::FULL, &pages[0].text).await;
            for page in pages.iter_mut() {
                page.merge_fields(metadata.iter());
            }
        }

        self.store.create_collection(&collection).await?;
        for page in &pages {
            self.store
                .add(&collection, &[to_store_record(&collection, page)])
                .await?;
        }

        Ok(IngestOutcome::Uploaded {
            collection,
            pages: pages.len(),
        })
    }
}

fn to_store_record(collection: &str, page: &PdfPageRecord) -> StoreRecord {
    StoreRecord {
        id: page_record_id(collection, page.metadata.page_number),
        document: page.text.clone(),
        metadata: page.metadata.to_map(),
    }
}
