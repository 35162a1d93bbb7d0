//! Custom error types for gscholar-rag.
//!
//! Every library operation returns `Result<T, ScholarError>`; the binary wraps
//! these in `anyhow` at the command boundary.

use thiserror::Error;

/// Main error type for gscholar-rag operations.
#[derive(Debug, Error)]
pub enum ScholarError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML or model-output parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external service
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message from API
        message: String,
    },

    /// CAPTCHA interstitial served instead of results
    #[error("CAPTCHA detected, slow down or refresh the session")]
    Captcha,

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// PDF could not be loaded
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Vector store rejected a request or returned an unexpected shape
    #[error("Store error: {0}")]
    Store(String),

    /// Tokenizer could not be initialised
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl ScholarError {
    /// True for responses that should be retried after a backoff.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ScholarError::RateLimited(_))
            || matches!(self, ScholarError::Api { code: 429, .. })
    }
}

/// Result type alias using `ScholarError`
pub type Result<T> = std::result::Result<T, ScholarError>;
