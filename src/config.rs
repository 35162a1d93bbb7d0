//! Credentials and endpoint configuration.
//!
//! Store credentials are mandatory for the collection jobs and are resolved
//! before any per-item work begins. Model and embedding endpoints are
//! OpenAI-compatible and default to the hosted services the pipeline was
//! built against; each field can be overridden from the environment or CLI.

use crate::error::{Result, ScholarError};

/// Default Chroma Cloud host
pub const DEFAULT_CHROMA_HOST: &str = "https://api.trychroma.com";

/// Default OpenAI-compatible chat endpoint (Groq)
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default chat model
pub const DEFAULT_LLM_MODEL: &str = "llama-3.1-8b-instant";

/// Default embeddings endpoint
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const CHROMA_API_KEY: &str = "CHROMA_API_KEY";
const CHROMA_TENANT: &str = "CHROMA_TENANT";
const CHROMA_DATABASE: &str = "CHROMA_DATABASE";

/// Vector-store credentials.
#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub host: String,
    pub api_key: String,
    pub tenant: String,
    pub database: String,
}

impl StoreCredentials {
    /// Read credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ScholarError::Config` listing every required variable that is
    /// unset or blank.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve credentials through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = read(CHROMA_API_KEY);
        let tenant = read(CHROMA_TENANT);
        let database = read(CHROMA_DATABASE);

        match (api_key, tenant, database) {
            (Some(api_key), Some(tenant), Some(database)) => Ok(Self {
                host: read("CHROMA_HOST").unwrap_or_else(|| DEFAULT_CHROMA_HOST.to_string()),
                api_key,
                tenant,
                database,
            }),
            (api_key, tenant, database) => {
                let missing: Vec<&str> = [
                    (CHROMA_API_KEY, api_key.is_none()),
                    (CHROMA_TENANT, tenant.is_none()),
                    (CHROMA_DATABASE, database.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| *name)
                .collect();
                Err(ScholarError::Config(format!(
                    "Missing Chroma Cloud credentials in environment variables: {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

/// Hosted chat-model configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Build a config from explicit overrides, falling back to the environment
    /// (`LLM_BASE_URL`, `LLM_API_KEY`/`GROQ_API_KEY`, `LLM_MODEL`).
    pub fn resolve(
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let api_key = api_key
            .or_else(|| env("LLM_API_KEY"))
            .or_else(|| env("GROQ_API_KEY"))
            .ok_or_else(|| {
                ScholarError::Config(
                    "No model API key: set GROQ_API_KEY or LLM_API_KEY, or pass --llm-key"
                        .to_string(),
                )
            })?;

        Ok(Self {
            base_url: base_url
                .or_else(|| env("LLM_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            api_key,
            model: model
                .or_else(|| env("LLM_MODEL"))
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            temperature: 0.0,
            max_tokens: 1000,
        })
    }
}

/// Embeddings endpoint configuration, used by the vector store for add and query.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_retries: u32,
}

impl EmbeddingConfig {
    /// Read from `EMBEDDING_BASE_URL`, `EMBEDDING_MODEL` and
    /// `EMBEDDING_API_KEY`/`OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let api_key = env("EMBEDDING_API_KEY")
            .or_else(|| env("OPENAI_API_KEY"))
            .ok_or_else(|| {
                ScholarError::Config(
                    "No embedding API key: set EMBEDDING_API_KEY or OPENAI_API_KEY".to_string(),
                )
            })?;

        Ok(Self {
            base_url: env("EMBEDDING_BASE_URL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_BASE_URL.to_string()),
            api_key,
            model: env("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            max_retries: 3,
        })
    }
}
