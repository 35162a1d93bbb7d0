//! Text embeddings for vector-store writes and queries.
//!
//! Retry strategy for the OpenAI-compatible provider:
//! - HTTP 429 and 5xx: retry with exponential backoff (1s, 2s, 4s, capped at 2^5)
//! - other 4xx: fail immediately
//! - network errors: retry

use crate::config::EmbeddingConfig;
use crate::error::{Result, ScholarError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Turns texts into vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ScholarError::Parse("Empty embedding response".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder behind an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
    backoff_unit: Duration,
}

impl OpenAiEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            backoff_unit: Duration::from_secs(1),
        })
    }

    /// Scale the retry delays (zero in tests).
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.backoff_unit * (1u32 << (attempt - 1).min(5));
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying embeddings");
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "Embedding request failed");
                    last_err = Some(ScholarError::Network(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
                    ScholarError::Parse(format!("Invalid embeddings response: {}", e))
                })?;
                return order_by_index(parsed, texts.len());
            }

            let body_text = response.text().await.unwrap_or_default();
            let err = ScholarError::Api {
                code: status.as_u16() as i32,
                message: format!("Embeddings API error {}: {}", status, body_text),
            };

            if status.as_u16() == 429 || status.is_server_error() {
                warn!(attempt, status = status.as_u16(), "Embeddings endpoint busy");
                last_err = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_err
            .unwrap_or_else(|| ScholarError::Parse("Embedding failed after retries".to_string())))
    }
}

fn order_by_index(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut items = response.data;
    if items.len() != expected {
        return Err(ScholarError::Parse(format!(
            "Expected {} embeddings, got {}",
            expected,
            items.len()
        )));
    }
    items.sort_by_key(|item| item.index);
    Ok(items.into_iter().map(|item| item.embedding).collect())
}
