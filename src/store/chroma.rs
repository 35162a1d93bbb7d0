//! Hosted Chroma backend over the v2 REST API.
//!
//! Collections are addressed by name for lookup and by id for record
//! operations. Documents and query text are embedded client-side through an
//! [`Embedder`]; metadata-only updates never re-embed, so a store built
//! without an embedder still lists, reads and updates.

use super::{Metadata, MetadataFilter, QueryHit, StoreRecord, VectorStore};
use crate::config::StoreCredentials;
use crate::embedding::Embedder;
use crate::error::{Result, ScholarError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Page size for collection listing
const LIST_PAGE_SIZE: usize = 100;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Embedded in place of a blank document; embedding endpoints reject `""`.
const BLANK_EMBEDDING_INPUT: &str = " ";

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Metadata>>>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

/// Chroma Cloud (or self-hosted v2) client.
pub struct ChromaStore {
    client: reqwest::Client,
    credentials: StoreCredentials,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ChromaStore {
    pub fn new(credentials: StoreCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials,
            embedder: None,
        })
    }

    /// Enable `add` and `query`, which need vectors.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    fn embedder(&self) -> Result<&dyn Embedder> {
        self.embedder.as_deref().ok_or_else(|| {
            ScholarError::Config("Store has no embedder; set EMBEDDING_API_KEY or OPENAI_API_KEY".to_string())
        })
    }

    /// `{host}/api/v2/tenants/{t}/databases/{d}/collections/{extra...}`
    fn collections_url(&self, extra: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.credentials.host).map_err(|e| {
            ScholarError::Config(format!("Invalid store host '{}': {}", self.credentials.host, e))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ScholarError::Config(format!("Store host '{}' cannot be a base", self.credentials.host))
            })?;
            segments.pop_if_empty().extend([
                "api",
                "v2",
                "tenants",
                self.credentials.tenant.as_str(),
                "databases",
                self.credentials.database.as_str(),
                "collections",
            ]);
            segments.extend(extra);
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .header("x-chroma-token", &self.credentials.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 429 {
            return Err(ScholarError::RateLimited(1));
        }
        let body = response.text().await.unwrap_or_default();
        Err(ScholarError::Api {
            code: status.as_u16() as i32,
            message: format!("Chroma API error {}: {}", status, body),
        })
    }

    async fn collection_id(&self, name: &str) -> Result<String> {
        let url = self.collections_url(&[name])?;
        let info: CollectionInfo = self.send(self.client.get(url)).await?.json().await?;
        Ok(info.id)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut url = self.collections_url(&[])?;
            url.query_pairs_mut()
                .append_pair("limit", &LIST_PAGE_SIZE.to_string())
                .append_pair("offset", &offset.to_string());

            let page: Vec<CollectionInfo> = self.send(self.client.get(url)).await?.json().await?;
            let count = page.len();
            names.extend(page.into_iter().map(|c| c.name));

            if count < LIST_PAGE_SIZE {
                break;
            }
            offset += count;
        }

        debug!(count = names.len(), "Listed collections");
        Ok(names)
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        let url = self.collections_url(&[])?;
        let body = json!({ "name": name, "get_or_create": false });
        self.send(self.client.post(url).json(&body)).await?;
        debug!(collection = name, "Created collection");
        Ok(())
    }

    async fn add(&self, collection: &str, records: &[StoreRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let embedder = self.embedder()?;
        let id = self.collection_id(collection).await?;
        let documents: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
        let embeddings = embedder.embed(&embedding_inputs(&documents)).await?;

        let body = json!({
            "ids": records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            "embeddings": embeddings,
            "documents": documents,
            "metadatas": records.iter().map(|r| &r.metadata).collect::<Vec<_>>(),
        });
        let url = self.collections_url(&[&id, "add"])?;
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoreRecord>> {
        let id = self.collection_id(collection).await?;
        let mut body = json!({ "include": ["documents", "metadatas"] });
        if let Some(filter) = filter {
            body["where"] = filter.to_where();
        }

        let url = self.collections_url(&[&id, "get"])?;
        let response: GetResponse = self.send(self.client.post(url).json(&body)).await?.json().await?;

        let mut documents = response.documents.unwrap_or_default().into_iter();
        let mut metadatas = response.metadatas.unwrap_or_default().into_iter();
        Ok(response
            .ids
            .into_iter()
            .map(|id| StoreRecord {
                id,
                document: documents.next().flatten().unwrap_or_default(),
                metadata: metadatas.next().flatten().unwrap_or_default(),
            })
            .collect())
    }

    async fn update_metadata(&self, collection: &str, id: &str, metadata: &Metadata) -> Result<()> {
        let collection_id = self.collection_id(collection).await?;
        let body = json!({ "ids": [id], "metadatas": [metadata] });
        let url = self.collections_url(&[&collection_id, "update"])?;
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn query(&self, collection: &str, text: &str, n_results: usize) -> Result<Vec<QueryHit>> {
        let embedder = self.embedder()?;
        let id = self.collection_id(collection).await?;
        let embedding = embedder.embed_one(text).await?;
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });

        let url = self.collections_url(&[&id, "query"])?;
        let response: QueryResponse =
            self.send(self.client.post(url).json(&body)).await?.json().await?;

        let ids = response.ids.into_iter().next().unwrap_or_default();
        let mut documents = response
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default()
            .into_iter();
        let mut metadatas = response
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default()
            .into_iter();
        let mut distances = response
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default()
            .into_iter();

        Ok(ids
            .into_iter()
            .map(|id| QueryHit {
                id,
                document: documents.next().flatten().unwrap_or_default(),
                metadata: metadatas.next().flatten().unwrap_or_default(),
                distance: distances.next().flatten(),
            })
            .collect())
    }
}

/// Texts to embed for `documents`, with blank ones replaced by a placeholder.
fn embedding_inputs(documents: &[String]) -> Vec<String> {
    documents
        .iter()
        .map(|d| {
            if d.trim().is_empty() {
                BLANK_EMBEDDING_INPUT.to_string()
            } else {
                d.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoEmbedder;

    #[async_trait]
    impl Embedder for NoEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    fn store(host: &str) -> Result<ChromaStore> {
        ChromaStore::new(
            StoreCredentials {
                host: host.to_string(),
                api_key: "key".to_string(),
                tenant: "my tenant".to_string(),
                database: "db".to_string(),
            },
        )
        .map(|s| s.with_embedder(Arc::new(NoEmbedder)))
    }

    #[test]
    fn test_collections_url_escapes_segments() -> Result<()> {
        let store = store("https://api.trychroma.com")?;
        let url = store.collections_url(&["abc", "get"])?;
        assert_eq!(
            url.as_str(),
            "https://api.trychroma.com/api/v2/tenants/my%20tenant/databases/db/collections/abc/get"
        );
        Ok(())
    }

    #[test]
    fn test_collections_url_with_trailing_slash_host() -> Result<()> {
        let store = store("http://localhost:8000/")?;
        let url = store.collections_url(&[])?;
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/v2/tenants/my%20tenant/databases/db/collections"
        );
        Ok(())
    }

    #[test]
    fn test_blank_documents_get_placeholder_input() {
        let documents = vec!["".to_string(), "Page two".to_string(), " \n".to_string()];
        assert_eq!(embedding_inputs(&documents), vec![" ", "Page two", " "]);
    }

    #[tokio::test]
    async fn test_add_without_embedder_is_config_error() -> Result<()> {
        let store = ChromaStore::new(StoreCredentials {
            host: "http://127.0.0.1:9".to_string(),
            api_key: "key".to_string(),
            tenant: "t".to_string(),
            database: "d".to_string(),
        })?;
        let record = StoreRecord {
            id: "x_page_1".to_string(),
            document: "text".to_string(),
            metadata: Metadata::new(),
        };
        assert!(matches!(store.add("x", &[record]).await, Err(ScholarError::Config(_))));
        assert!(matches!(store.query("x", "q", 1).await, Err(ScholarError::Config(_))));
        Ok(())
    }

    #[test]
    fn test_query_response_tolerates_null_entries() -> Result<()> {
        let response: QueryResponse = serde_json::from_str(
            r#"{"ids": [["a", "b"]], "documents": [["text a", null]],
                "metadatas": [[{"page_number": 1}, null]], "distances": [[0.1, 0.2]]}"#,
        )?;
        assert_eq!(response.ids[0].len(), 2);
        assert_eq!(response.documents.as_ref().map(|d| d[0][1].is_none()), Some(true));
        Ok(())
    }
}
