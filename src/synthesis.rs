//! Retrieval across every collection followed by chunked synthesis.
//!
//! The same query runs against each collection independently. Hits are
//! rendered with their provenance, packed into token-bounded chunks, large
//! chunks are summarized first, and each chunk is then turned into a list
//! of statements by the hosted model.

use crate::chunk::{chunk_paragraphs, TokenCounter};
use crate::error::Result;
use crate::llm::ChatModel;
use crate::prompts::{build_statements_prompt, build_summary_prompt};
use crate::store::{Metadata, VectorStore};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Separator between per-chunk results in the report.
pub const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub query: String,
    pub n_results: usize,
    /// What the statements prompt asks the model to identify.
    pub context: String,
    pub chunk_tokens: usize,
    /// Chunks above this many tokens are summarized first.
    pub summarize_above: usize,
    pub summary_ratio: f64,
    pub min_summary_tokens: usize,
    pub output: PathBuf,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            query: "Find active records".to_string(),
            n_results: 5,
            context: "future study".to_string(),
            chunk_tokens: 7500,
            summarize_above: 6000,
            summary_ratio: 0.2,
            min_summary_tokens: 200,
            output: PathBuf::from("article_description.txt"),
        }
    }
}

/// One query hit tagged with the collection it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub collection: String,
    pub document: String,
    pub metadata: Metadata,
}

/// Query every collection with `query`. A collection whose query fails is
/// logged and left out.
pub async fn gather_passages(
    store: &dyn VectorStore,
    query: &str,
    n_results: usize,
) -> Result<Vec<RetrievedPassage>> {
    let collections = store.list_collections().await?;
    let mut passages = Vec::new();

    for collection in collections {
        println!("Querying collection: {}", collection);
        match store.query(&collection, query, n_results).await {
            Ok(hits) => {
                debug!(collection = %collection, hits = hits.len(), "Query returned");
                passages.extend(hits.into_iter().map(|hit| RetrievedPassage {
                    collection: collection.clone(),
                    document: hit.document,
                    metadata: hit.metadata,
                }));
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "Query failed");
            }
        }
    }

    info!(count = passages.len(), "Gathered passages");
    Ok(passages)
}

/// Render passages with their provenance, one block per passage.
pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| {
            let metadata = serde_json::to_string(&p.metadata).unwrap_or_else(|_| "{}".to_string());
            format!(
                "Collection: {}\nDocument: {}\nMetadata: {}\n\n",
                p.collection, p.document, metadata
            )
        })
        .collect()
}

/// Outcome of a synthesis run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisReport {
    pub passages: usize,
    pub chunks: usize,
    pub summarized: usize,
    /// 1-based numbers of chunks left out after a model failure.
    pub failed_chunks: Vec<usize>,
    pub text: String,
}

pub struct Synthesizer<'a> {
    model: &'a dyn ChatModel,
    counter: &'a dyn TokenCounter,
    config: SynthesisConfig,
}

impl<'a> Synthesizer<'a> {
    pub fn new(model: &'a dyn ChatModel, counter: &'a dyn TokenCounter, config: SynthesisConfig) -> Self {
        Self {
            model,
            counter,
            config,
        }
    }

    /// Retrieve, synthesize and write the report to the configured output.
    pub async fn run(&self, store: &dyn VectorStore) -> Result<SynthesisReport> {
        let passages = gather_passages(store, &self.config.query, self.config.n_results).await?;
        let mut report = self.synthesize(&format_passages(&passages)).await;
        report.passages = passages.len();

        tokio::fs::write(&self.config.output, &report.text).await?;
        println!("Results written to {}", self.config.output.display());
        Ok(report)
    }

    /// Chunk `text` and turn each chunk into statements.
    pub async fn synthesize(&self, text: &str) -> SynthesisReport {
        let chunks = chunk_paragraphs(text, self.counter, self.config.chunk_tokens);
        println!("Split data into {} chunks to manage token limits", chunks.len());

        let mut report = SynthesisReport {
            chunks: chunks.len(),
            ..Default::default()
        };
        let mut results = Vec::with_capacity(chunks.len());

        for (idx, chunk) in chunks.iter().enumerate() {
            let number = idx + 1;
            match self.process_chunk(chunk, &mut report).await {
                Ok(statements) => {
                    results.push(format!("Chunk {} overview:\n{}", number, statements));
                }
                Err(e) => {
                    warn!(chunk = number, error = %e, "Chunk synthesis failed");
                    report.failed_chunks.push(number);
                }
            }
        }

        report.text = results.join(CHUNK_SEPARATOR);
        info!(
            chunks = report.chunks,
            summarized = report.summarized,
            failed = report.failed_chunks.len(),
            "Synthesis complete"
        );
        report
    }

    async fn process_chunk(&self, chunk: &str, report: &mut SynthesisReport) -> Result<String> {
        let tokens = self.counter.count(chunk);
        let text = if tokens > self.config.summarize_above {
            let target = self
                .config
                .min_summary_tokens
                .max((tokens as f64 * self.config.summary_ratio) as usize);
            debug!(tokens, target, "Summarizing chunk");
            let summary = self.model.complete(&build_summary_prompt(chunk, target)).await?;
            report.summarized += 1;
            summary
        } else {
            chunk.to_string()
        };

        self.model
            .complete(&build_statements_prompt(&self.config.context, &text))
            .await
    }
}
