//! # gscholar_rag
//!
//! Google Scholar literature collection feeding a hosted vector store.
//!
//! ## Modules
//!
//! - [`gscholar`] - Result-page fetching and one-pass harvesting
//! - [`parser`] - Result-block parsing into Title/Author/Year/URL records
//! - [`download`] - PDF download from a results file
//! - [`verify`] - Content-type check of downloaded PDFs
//! - [`pdf`] - Per-page text extraction
//! - [`llm`], [`prompts`], [`metadata`] - Hosted model and metadata inference
//! - [`embedding`], [`store`] - Embeddings and the collection store
//! - [`ingest`], [`backfill`] - Upload and metadata backfill passes
//! - [`chunk`], [`synthesis`] - Retrieval and chunked synthesis
//! - [`keywords`] - Word-frequency and keyword counts
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gscholar_rag::gscholar::{FetchOptions, Harvester, Pacing};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = FetchOptions {
//!         pacing: Pacing::harvester(),
//!         ..Default::default()
//!     };
//!     let records = Harvester::new(options)?.harvest("chatgpt education", 20).await?;
//!     println!("Found {} results", records.len());
//!     Ok(())
//! }
//! ```

pub mod backfill;
pub mod chunk;
pub mod config;
pub mod download;
pub mod embedding;
pub mod error;
pub mod gscholar;
pub mod ingest;
pub mod keywords;
pub mod llm;
pub mod metadata;
pub mod parser;
pub mod pdf;
pub mod prompts;
pub mod store;
pub mod synthesis;
pub mod verify;

pub use error::{Result, ScholarError};
