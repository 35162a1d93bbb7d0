//! gscholar-rag - Google Scholar literature pipeline
//!
//! Scrapes Google Scholar result pages, downloads and verifies the linked
//! PDFs, uploads them page by page to a hosted vector store, and
//! synthesizes statements from what the store returns.
//!
//! ## Usage
//!
//! ```bash
//! gscholar-rag fetch-pages "chatgpt education" --pages 5
//! gscholar-rag parse pages -o articles.csv --links url.txt
//! gscholar-rag download --csv articles.csv --out pdf
//! gscholar-rag verify --dir pdf
//! gscholar-rag ingest --dir pdf
//! gscholar-rag synthesize -o article_description.txt
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gscholar_rag::backfill::{backfill_collections, MetadataSource};
use gscholar_rag::chunk::Cl100kCounter;
use gscholar_rag::config::{EmbeddingConfig, LlmConfig, StoreCredentials};
use gscholar_rag::download::Downloader;
use gscholar_rag::embedding::OpenAiEmbedder;
use gscholar_rag::gscholar::{FetchOptions, Harvester, PageFetcher, Pacing};
use gscholar_rag::ingest::Ingester;
use gscholar_rag::keywords;
use gscholar_rag::llm::{ChatModel, OpenAiChatModel};
use gscholar_rag::parser::{self, ParseProfile};
use gscholar_rag::store::chroma::ChromaStore;
use gscholar_rag::synthesis::{SynthesisConfig, Synthesizer};
use gscholar_rag::verify::{verify_directory, FileCommandDetector};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Google Scholar literature pipeline with a hosted vector store
#[derive(Parser)]
#[command(name = "gscholar-rag")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Search options shared by the fetch modes.
#[derive(Args)]
struct SearchArgs {
    /// Mirror site URL
    #[arg(long)]
    mirror: Option<String>,

    /// Proxy URL (e.g., http://127.0.0.1:7890)
    #[arg(long)]
    proxy: Option<String>,

    /// Source data type filter
    #[arg(long, default_value = "0,5")]
    sdt: String,

    /// Year filter (results from this year onwards)
    #[arg(long)]
    ylo: Option<i32>,
}

impl SearchArgs {
    fn into_options(self, pacing: Pacing) -> FetchOptions {
        FetchOptions {
            base_url: self.mirror,
            proxy: self.proxy,
            sdt: self.sdt,
            ylo: self.ylo,
            pacing,
        }
    }
}

/// Hosted model overrides; the environment supplies the rest.
#[derive(Args)]
struct LlmArgs {
    /// LLM API base URL (OpenAI-compatible, default Groq)
    #[arg(long)]
    llm_base_url: Option<String>,

    /// LLM API key
    #[arg(long)]
    llm_key: Option<String>,

    /// LLM model name
    #[arg(long)]
    llm_model: Option<String>,
}

impl LlmArgs {
    fn build(self) -> Result<OpenAiChatModel> {
        let config = LlmConfig::resolve(self.llm_base_url, self.llm_key, self.llm_model)
            .context("Failed to configure hosted model")?;
        Ok(OpenAiChatModel::new(config)?)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    /// Title/author/year plus any link in the row
    Listing,
    /// Only links ending in .pdf
    PdfLinks,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    /// Ask the hosted model
    Llm,
    /// Read `Key: value` lines from page one
    Prefix,
}

#[derive(Subcommand)]
enum Commands {
    /// Save numbered result pages for a query
    FetchPages {
        /// Search query
        query: String,

        /// Number of result pages to save
        #[arg(long, default_value = "10")]
        pages: u32,

        /// Output directory
        #[arg(long, default_value = "pages")]
        out: PathBuf,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Fetch and parse results straight into a CSV file
    Harvest {
        /// Search query
        query: String,

        /// Number of articles to collect
        #[arg(short, default_value = "10")]
        n: u32,

        /// Output CSV file
        #[arg(short, long, default_value = "articles.csv")]
        output: PathBuf,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Parse a directory of saved result pages
    Parse {
        /// Directory containing saved HTML pages
        directory: PathBuf,

        /// Output CSV file
        #[arg(short, long, default_value = "articles.csv")]
        output: PathBuf,

        /// Parsing profile
        #[arg(long, value_enum, default_value = "listing")]
        profile: ProfileArg,

        /// File receiving one accepted URL per line
        #[arg(long, default_value = "url.txt")]
        links: PathBuf,
    },

    /// Download the PDFs listed in a results file
    Download {
        /// Results CSV with a URL column
        #[arg(long, default_value = "articles.csv")]
        csv: PathBuf,

        /// Output directory
        #[arg(long, default_value = "pdf")]
        out: PathBuf,

        /// Proxy URL
        #[arg(long)]
        proxy: Option<String>,
    },

    /// Strip the .pdf extension from downloads that are not PDFs
    Verify {
        /// Directory of downloaded files
        #[arg(long, default_value = "pdf")]
        dir: PathBuf,
    },

    /// Upload each PDF to its own collection, one record per page
    Ingest {
        /// Directory of PDFs
        #[arg(long, default_value = "pdf")]
        dir: PathBuf,

        /// Skip metadata inference
        #[arg(long)]
        no_llm: bool,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Re-infer document metadata for every uploaded collection
    Backfill {
        /// Metadata source
        #[arg(long, value_enum, default_value = "llm")]
        strategy: Strategy,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Query every collection and synthesize statements from the hits
    Synthesize {
        /// Query sent to every collection
        #[arg(long, default_value = "Find active records")]
        query: String,

        /// Results per collection
        #[arg(long, default_value = "5")]
        n_results: usize,

        /// What the model should identify in the text
        #[arg(long, default_value = "future study")]
        context: String,

        /// Output report file
        #[arg(short, long, default_value = "article_description.txt")]
        output: PathBuf,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Count the keywords listed on a `**Keyword(s)**` line
    KeywordCount {
        /// Input text file
        input: PathBuf,

        /// Output JSON file
        output: PathBuf,
    },

    /// Word frequencies of a text file
    WordFreq {
        /// Input text file
        input: PathBuf,

        /// Output JSON file
        #[arg(short, long, default_value = "word_freq.json")]
        output: PathBuf,

        /// Count every token, keeping case and short words
        #[arg(long)]
        raw: bool,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::FetchPages {
            query,
            pages,
            out,
            search,
        } => {
            let fetcher = PageFetcher::new(search.into_options(Pacing::page_fetcher()))?;
            let summary = fetcher.fetch_pages(&query, pages, &out).await?;
            println!(
                "Saved {} pages to {} ({} failed)",
                summary.saved.len(),
                out.display(),
                summary.failed.len()
            );
            Ok(())
        }
        Commands::Harvest {
            query,
            n,
            output,
            search,
        } => {
            let harvester = Harvester::new(search.into_options(Pacing::harvester()))?;
            let records = harvester.harvest(&query, n).await?;
            parser::write_records_csv(&output, &records)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Results saved to {}", output.display());
            Ok(())
        }
        Commands::Parse {
            directory,
            output,
            profile,
            links,
        } => run_parse(&directory, &output, profile, &links),
        Commands::Download { csv, out, proxy } => {
            let urls = parser::read_urls_csv(&csv)
                .with_context(|| format!("Failed to read {}", csv.display()))?;
            let summary = Downloader::new(proxy.as_deref())?
                .download_all(&urls, &out)
                .await?;
            println!(
                "Downloaded {}, failed {}, skipped {}",
                summary.downloaded.len(),
                summary.failed.len(),
                summary.skipped.len()
            );
            Ok(())
        }
        Commands::Verify { dir } => {
            let summary = verify_directory(&dir, &FileCommandDetector)
                .with_context(|| format!("Failed to verify {}", dir.display()))?;
            info!(
                valid = summary.valid.len(),
                renamed = summary.renamed.len(),
                "Verification complete"
            );
            Ok(())
        }
        Commands::Ingest { dir, no_llm, llm } => {
            let store = connect_store(true)?;
            let model = if no_llm { None } else { Some(llm.build()?) };
            let model_ref = model.as_ref().map(|m| m as &dyn ChatModel);

            let summary = Ingester::new(&store, model_ref).ingest_directory(&dir).await?;
            if let Some(model) = &model {
                log_usage(model);
            }
            println!(
                "\nUploaded {} documents ({} pages), skipped {}, failed {}",
                summary.uploaded.len(),
                summary.pages,
                summary.skipped_existing.len(),
                summary.failed.len()
            );
            Ok(())
        }
        Commands::Backfill { strategy, llm } => {
            let store = connect_store(false)?;
            match strategy {
                Strategy::Llm => {
                    let model = llm.build()?;
                    backfill_collections(&store, MetadataSource::Model(&model)).await?;
                    log_usage(&model);
                }
                Strategy::Prefix => {
                    backfill_collections(&store, MetadataSource::PrefixedLines).await?;
                }
            }
            Ok(())
        }
        Commands::Synthesize {
            query,
            n_results,
            context,
            output,
            llm,
        } => {
            let store = connect_store(true)?;
            let model = llm.build()?;
            let counter = Cl100kCounter::new()?;
            let config = SynthesisConfig {
                query,
                n_results,
                context,
                output,
                ..Default::default()
            };

            let report = Synthesizer::new(&model, &counter, config).run(&store).await?;
            log_usage(&model);
            println!("Document Categorizations:");
            println!("{}", report.text);
            Ok(())
        }
        Commands::KeywordCount { input, output } => {
            keywords::run_keyword_count(&input, &output)?;
            Ok(())
        }
        Commands::WordFreq { input, output, raw } => {
            let counts = keywords::run_word_frequencies(&input, &output, raw)?;
            println!("{} distinct words saved to {}", counts.len(), output.display());
            Ok(())
        }
    }
}

fn run_parse(directory: &Path, output: &Path, profile: ProfileArg, links: &Path) -> Result<()> {
    let profile = match profile {
        ProfileArg::Listing => ParseProfile::LISTING,
        ProfileArg::PdfLinks => ParseProfile::PDF_LINKS,
    };

    let link_file = File::create(links)
        .with_context(|| format!("Failed to create {}", links.display()))?;
    let mut link_sink = BufWriter::new(link_file);

    let records = parser::process_directory(directory, profile, &mut link_sink)
        .with_context(|| format!("Failed to parse pages in {}", directory.display()))?;
    link_sink.flush()?;
    parser::write_records_csv(output, &records)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Results saved to {}", output.display());
    Ok(())
}

/// Resolve credentials before any per-item work. Only stages that add or
/// query records need the embeddings endpoint.
fn connect_store(with_embeddings: bool) -> Result<ChromaStore> {
    let credentials = StoreCredentials::from_env().context("Missing vector store credentials")?;
    let store = ChromaStore::new(credentials)?;
    if !with_embeddings {
        return Ok(store);
    }

    let embedding = EmbeddingConfig::from_env().context("Missing embedding configuration")?;
    let embedder = Arc::new(OpenAiEmbedder::new(embedding)?);
    Ok(store.with_embedder(embedder))
}

fn log_usage(model: &OpenAiChatModel) {
    let usage = model.usage();
    info!(
        model = model.model(),
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "Model token usage"
    );
}
