//! HTTP-level tests for every outbound client.
//!
//! Uses wiremock to stand in for Google Scholar, PDF hosts, the hosted model,
//! the embeddings endpoint and the Chroma REST API.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use gscholar_rag::config::{EmbeddingConfig, LlmConfig, StoreCredentials};
use gscholar_rag::download::Downloader;
use gscholar_rag::embedding::{Embedder, OpenAiEmbedder};
use gscholar_rag::error::{Result, ScholarError};
use gscholar_rag::gscholar::{DelayRange, FetchOptions, Harvester, PageFetcher, Pacing};
use gscholar_rag::llm::{ChatModel, OpenAiChatModel};
use gscholar_rag::store::chroma::ChromaStore;
use gscholar_rag::store::{Metadata, MetadataFilter, StoreRecord, VectorStore};

const COLLECTIONS: &str = "/api/v2/tenants/t/databases/d/collections";

/// A result page with `count` blocks numbered from `first`.
fn results_page(first: usize, count: usize) -> String {
    let blocks: String = (first..first + count)
        .map(|i| {
            format!(
                r#"<div class="gs_r gs_or gs_scl"><div class="gs_ri">
  <h3 class="gs_rt"><a href="https://example.org/{i}">Paper {i}</a></h3>
  <div class="gs_a">Author {i} - Journal, 2022 - Publisher</div>
</div></div>"#
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", blocks)
}

fn options(server: &MockServer) -> FetchOptions {
    FetchOptions {
        base_url: Some(server.uri()),
        pacing: Pacing::none(),
        ..Default::default()
    }
}

struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
    }
}

fn credentials(server: &MockServer) -> StoreCredentials {
    StoreCredentials {
        host: server.uri(),
        api_key: "secret".to_string(),
        tenant: "t".to_string(),
        database: "d".to_string(),
    }
}

fn chroma(server: &MockServer) -> Result<ChromaStore> {
    Ok(ChromaStore::new(credentials(server))?.with_embedder(Arc::new(FixedEmbedder)))
}

async fn mount_collection_lookup(server: &MockServer, name: &str, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", COLLECTIONS, name)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": id, "name": name})))
        .mount(server)
        .await;
}

// ============================================================================
// Google Scholar
// ============================================================================

#[tokio::test]
async fn test_fetcher_saves_pages_and_skips_after_one_retry() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("start", "0"))
        .and(query_param("q", "chatgpt education"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(1, 2)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("start", "10"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new()?;
    let summary = PageFetcher::new(options(&server))?
        .fetch_pages("chatgpt education", 2, dir.path())
        .await?;

    assert_eq!(summary.saved, vec![dir.path().join("1.html")]);
    assert_eq!(summary.failed, vec![2]);
    assert!(std::fs::read_to_string(dir.path().join("1.html"))?.contains("Paper 1"));
    Ok(())
}

#[tokio::test]
async fn test_fetcher_saves_page_when_retry_succeeds() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(1, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let pause = Duration::from_millis(200);
    let options = FetchOptions {
        pacing: Pacing {
            between_pages: DelayRange::new(pause, pause),
            ..Pacing::none()
        },
        ..options(&server)
    };

    let dir = TempDir::new()?;
    let started = std::time::Instant::now();
    let summary = PageFetcher::new(options)?
        .fetch_pages("q", 1, dir.path())
        .await?;

    assert_eq!(summary.saved, vec![dir.path().join("1.html")]);
    assert!(summary.failed.is_empty());
    assert!(std::fs::read_to_string(dir.path().join("1.html"))?.contains("Paper 1"));
    // A page saved on the retry still gets the between-pages pause.
    assert!(started.elapsed() >= pause);
    Ok(())
}

#[tokio::test]
async fn test_fetcher_treats_captcha_as_failure() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html>Our systems have detected unusual traffic from your computer network.</html>",
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new()?;
    let summary = PageFetcher::new(options(&server))?
        .fetch_pages("q", 1, dir.path())
        .await?;

    assert!(summary.saved.is_empty());
    assert_eq!(summary.failed, vec![1]);
    assert!(!dir.path().join("1.html").exists());
    Ok(())
}

#[tokio::test]
async fn test_harvester_backs_off_on_429_and_truncates() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(1, 10)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("start", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(11, 10)))
        .mount(&server)
        .await;

    let records = Harvester::new(options(&server))?.harvest("q", 15).await?;

    assert_eq!(records.len(), 15);
    assert_eq!(records[0].title, "Paper 1");
    assert_eq!(records[0].author, "Author 1");
    assert_eq!(records[0].year, "2022");
    assert_eq!(records[0].url, "https://example.org/1");
    assert_eq!(records[14].title, "Paper 15");
    Ok(())
}

#[tokio::test]
async fn test_harvester_gives_up_after_three_rate_limited_attempts() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let records = Harvester::new(options(&server))?.harvest("q", 5).await?;

    assert!(records.is_empty());
    let requests = server.received_requests().await.map(|r| r.len());
    assert_eq!(requests, Some(3));
    Ok(())
}

#[tokio::test]
async fn test_harvester_skips_page_on_other_errors() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("start", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(11, 3)))
        .mount(&server)
        .await;

    let records = Harvester::new(options(&server))?.harvest("q", 20).await?;
    let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Paper 11", "Paper 12", "Paper 13"]);
    Ok(())
}

// ============================================================================
// PDF download
// ============================================================================

#[tokio::test]
async fn test_downloader_continues_past_failures() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/good.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 body".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let urls = vec![
        format!("{}/files/gone.pdf", server.uri()),
        "N/A".to_string(),
        format!("{}/files/good.pdf", server.uri()),
    ];

    let dir = TempDir::new()?;
    let summary = Downloader::new(None)?.download_all(&urls, dir.path()).await?;

    assert_eq!(summary.downloaded, vec![dir.path().join("good.pdf")]);
    assert_eq!(summary.failed, vec![urls[0].clone()]);
    assert_eq!(summary.skipped, vec!["N/A".to_string()]);
    assert_eq!(std::fs::read(dir.path().join("good.pdf"))?, b"%PDF-1.4 body");
    assert!(!dir.path().join("gone.pdf").exists());
    Ok(())
}

// ============================================================================
// Hosted model and embeddings
// ============================================================================

fn llm_config(server: &MockServer) -> LlmConfig {
    LlmConfig {
        base_url: server.uri(),
        api_key: "k".to_string(),
        model: "llama-3.1-8b-instant".to_string(),
        temperature: 0.0,
        max_tokens: 1000,
    }
}

#[tokio::test]
async fn test_chat_model_returns_first_choice_and_tracks_usage() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer k"))
        .and(body_partial_json(json!({
            "model": "llama-3.1-8b-instant",
            "messages": [{"role": "user", "content": "Extract"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"Title\": \"T\"}"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        })))
        .mount(&server)
        .await;

    let model = OpenAiChatModel::new(llm_config(&server))?;
    assert_eq!(model.complete("Extract").await?, "{\"Title\": \"T\"}");
    assert_eq!(model.usage().total_tokens, 16);
    Ok(())
}

#[tokio::test]
async fn test_chat_model_maps_error_status() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let model = OpenAiChatModel::new(llm_config(&server))?;
    match model.complete("x").await {
        Err(ScholarError::Api { code, message }) => {
            assert_eq!(code, 500);
            assert!(message.contains("overloaded"));
        }
        other => panic!("expected API error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_embedder_retries_server_errors_and_orders_by_index() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        })))
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(EmbeddingConfig {
        base_url: server.uri(),
        api_key: "k".to_string(),
        model: "text-embedding-3-small".to_string(),
        max_retries: 2,
    })?
    .with_backoff_unit(Duration::ZERO);

    let vectors = embedder
        .embed(&["first".to_string(), "second".to_string()])
        .await?;
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    Ok(())
}

#[tokio::test]
async fn test_embedder_does_not_retry_client_errors() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(EmbeddingConfig {
        base_url: server.uri(),
        api_key: "bad".to_string(),
        model: "m".to_string(),
        max_retries: 3,
    })?
    .with_backoff_unit(Duration::ZERO);

    assert!(embedder.embed(&["x".to_string()]).await.is_err());
    Ok(())
}

// ============================================================================
// Chroma
// ============================================================================

#[tokio::test]
async fn test_chroma_lists_collections_with_token() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(COLLECTIONS))
        .and(header("x-chroma-token", "secret"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "1", "name": "alpha"},
            {"id": "2", "name": "beta"}
        ])))
        .mount(&server)
        .await;

    let store = chroma(&server)?;
    assert_eq!(store.list_collections().await?, vec!["alpha", "beta"]);
    assert!(store.collection_exists("beta").await?);
    assert!(!store.collection_exists("gamma").await?);
    Ok(())
}

#[tokio::test]
async fn test_chroma_create_and_add_embeds_documents() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COLLECTIONS))
        .and(body_partial_json(json!({"name": "paper"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1", "name": "paper"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_collection_lookup(&server, "paper", "c1").await;
    Mock::given(method("POST"))
        .and(path(format!("{}/c1/add", COLLECTIONS)))
        .and(body_partial_json(json!({
            "ids": ["paper_page_1"],
            "documents": ["abcd"],
            "embeddings": [[4.0, 1.0]],
            "metadatas": [{"page_number": 1}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = chroma(&server)?;
    store.create_collection("paper").await?;

    let mut metadata = Metadata::new();
    metadata.insert("page_number".to_string(), json!(1));
    store
        .add(
            "paper",
            &[StoreRecord {
                id: "paper_page_1".to_string(),
                document: "abcd".to_string(),
                metadata,
            }],
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_chroma_blank_page_embeds_placeholder_but_stores_empty_text() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_partial_json(json!({"input": [" ", "Second page"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 0, "embedding": [0.0, 0.0]},
                {"index": 1, "embedding": [0.5, 0.5]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_collection_lookup(&server, "scan", "c9").await;
    Mock::given(method("POST"))
        .and(path(format!("{}/c9/add", COLLECTIONS)))
        .and(body_partial_json(json!({
            "ids": ["scan_page_1", "scan_page_2"],
            "documents": ["", "Second page"]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(EmbeddingConfig {
        base_url: server.uri(),
        api_key: "k".to_string(),
        model: "text-embedding-3-small".to_string(),
        max_retries: 0,
    })?;
    let store = ChromaStore::new(credentials(&server))?.with_embedder(Arc::new(embedder));

    let records: Vec<StoreRecord> = ["", "Second page"]
        .iter()
        .enumerate()
        .map(|(i, text)| StoreRecord {
            id: format!("scan_page_{}", i + 1),
            document: text.to_string(),
            metadata: Metadata::new(),
        })
        .collect();
    store.add("scan", &records).await?;
    Ok(())
}

#[tokio::test]
async fn test_chroma_without_embedder_reads_and_updates() -> Result<()> {
    let server = MockServer::start().await;
    mount_collection_lookup(&server, "paper", "c1").await;
    Mock::given(method("POST"))
        .and(path(format!("{}/c1/get", COLLECTIONS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": ["paper_page_1"],
            "documents": ["Title: T"],
            "metadatas": [{"page_number": 1}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/c1/update", COLLECTIONS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = ChromaStore::new(credentials(&server))?;
    let records = store.get("paper", None).await?;
    assert_eq!(records.len(), 1);
    store
        .update_metadata("paper", &records[0].id, &records[0].metadata)
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_chroma_get_with_filter_and_update_metadata() -> Result<()> {
    let server = MockServer::start().await;
    mount_collection_lookup(&server, "paper", "c1").await;
    Mock::given(method("POST"))
        .and(path(format!("{}/c1/get", COLLECTIONS)))
        .and(body_partial_json(json!({"where": {"page_number": {"$eq": 1}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": ["paper_page_1"],
            "documents": ["Cover page"],
            "metadatas": [{"page_number": 1, "source_file": "paper.pdf"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/c1/update", COLLECTIONS)))
        .and(body_partial_json(json!({
            "ids": ["paper_page_1"],
            "metadatas": [{"Title": "T", "page_number": 1}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = chroma(&server)?;
    let records = store
        .get("paper", Some(&MetadataFilter::eq("page_number", 1)))
        .await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].document, "Cover page");

    let mut metadata = records[0].metadata.clone();
    metadata.insert("Title".to_string(), json!("T"));
    store.update_metadata("paper", "paper_page_1", &metadata).await?;
    Ok(())
}

#[tokio::test]
async fn test_chroma_query_flattens_first_row() -> Result<()> {
    let server = MockServer::start().await;
    mount_collection_lookup(&server, "paper", "c1").await;
    Mock::given(method("POST"))
        .and(path(format!("{}/c1/query", COLLECTIONS)))
        .and(body_partial_json(json!({"n_results": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": [["paper_page_3", "paper_page_1"]],
            "documents": [["third", "first"]],
            "metadatas": [[{"page_number": 3}, {"page_number": 1}]],
            "distances": [[0.12, 0.34]]
        })))
        .mount(&server)
        .await;

    let hits = chroma(&server)?.query("paper", "Find active records", 2).await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "paper_page_3");
    assert_eq!(hits[0].document, "third");
    assert_eq!(hits[1].metadata["page_number"], json!(1));
    assert_eq!(hits[0].distance, Some(0.12));
    Ok(())
}

#[tokio::test]
async fn test_chroma_error_status_surfaces() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/missing", COLLECTIONS)))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let err = chroma(&server)?
        .get("missing", None)
        .await
        .expect_err("lookup fails");
    assert!(matches!(err, ScholarError::Api { code: 404, .. }));
    Ok(())
}
