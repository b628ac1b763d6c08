//! Chroma vector store over the REST API (v1)
//!
//! Documents are upserted with their UUIDv5 id, `information` as the
//! Chroma document and `title` as metadata, so `exists` can filter on it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;

use sales_rag_config::constants::{endpoints, rag, timeouts};
use sales_rag_config::Settings;
use sales_rag_core::{ProductDocument, ProductHit, ProductStore, StoreKind};

use crate::{document_id, ensure_success, RagError};

/// Chroma configuration
#[derive(Debug, Clone)]
pub struct ChromaConfig {
    pub endpoint: String,
    pub collection: String,
    pub timeout: Duration,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::CHROMA_DEFAULT.to_string(),
            collection: rag::COLLECTION.to_string(),
            timeout: Duration::from_secs(timeouts::STORE_REQUEST_SECS),
        }
    }
}

impl From<&Settings> for ChromaConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            endpoint: settings.store.chroma.url.clone(),
            collection: settings.store.collection.clone(),
            timeout: Duration::from_secs(settings.store.timeout_secs),
        }
    }
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    ids: [String; 1],
    embeddings: [&'a [f32]; 1],
    documents: [&'a str; 1],
    metadatas: [serde_json::Value; 1],
}

#[derive(Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<serde_json::Value>>>,
    #[serde(default)]
    distances: Vec<Vec<Option<f32>>>,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
}

/// Chroma-backed product store
pub struct ChromaStore {
    client: reqwest::Client,
    config: ChromaConfig,
    collection_id: OnceCell<String>,
}

impl ChromaStore {
    pub fn new(config: ChromaConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config,
            collection_id: OnceCell::new(),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// Collection id, created on first use
    async fn collection_id(&self) -> Result<&str, RagError> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(self.api("/collections"))
                    .json(&json!({
                        "name": self.config.collection,
                        "get_or_create": true,
                        "metadata": { "hnsw:space": "cosine" }
                    }))
                    .send()
                    .await?;
                let info: CollectionInfo = ensure_success(response, "Chroma get_or_create")
                    .await?
                    .json()
                    .await?;

                tracing::info!(
                    collection = %self.config.collection,
                    id = %info.id,
                    "Chroma collection ready"
                );
                Ok::<_, RagError>(info.id)
            })
            .await?;
        Ok(id.as_str())
    }

    fn collection_path(id: &str, op: &str) -> String {
        format!("/collections/{}/{}", id, op)
    }
}

#[async_trait]
impl ProductStore for ChromaStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Vector
    }

    async fn ensure_ready(&self) -> sales_rag_core::Result<()> {
        self.collection_id().await?;
        Ok(())
    }

    async fn count(&self) -> sales_rag_core::Result<u64> {
        let id = self.collection_id().await?;
        let response = self
            .client
            .get(self.api(&Self::collection_path(id, "count")))
            .send()
            .await
            .map_err(RagError::from)?;
        let count: u64 = ensure_success(response, "Chroma count")
            .await?
            .json()
            .await
            .map_err(RagError::from)?;
        Ok(count)
    }

    async fn exists(&self, title: &str) -> sales_rag_core::Result<bool> {
        let id = self.collection_id().await?;
        let response = self
            .client
            .post(self.api(&Self::collection_path(id, "get")))
            .json(&json!({
                "where": { "title": title },
                "limit": 1,
                "include": []
            }))
            .send()
            .await
            .map_err(RagError::from)?;
        let found: GetResponse = ensure_success(response, "Chroma get")
            .await?
            .json()
            .await
            .map_err(RagError::from)?;
        Ok(!found.ids.is_empty())
    }

    async fn insert(
        &self,
        doc: &ProductDocument,
        embedding: Option<&[f32]>,
    ) -> sales_rag_core::Result<()> {
        let embedding = embedding
            .ok_or_else(|| RagError::VectorStore("Chroma insert requires an embedding".to_string()))?;
        let id = self.collection_id().await?;

        let request = UpsertRequest {
            ids: [document_id(&doc.title)],
            embeddings: [embedding],
            documents: [doc.information.as_str()],
            metadatas: [json!({ "title": doc.title })],
        };

        let response = self
            .client
            .post(self.api(&Self::collection_path(id, "upsert")))
            .json(&request)
            .send()
            .await
            .map_err(RagError::from)?;
        ensure_success(response, "Chroma upsert").await?;
        Ok(())
    }

    async fn search(
        &self,
        _text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> sales_rag_core::Result<Vec<ProductHit>> {
        let embedding = embedding
            .ok_or_else(|| RagError::Search("Chroma search requires an embedding".to_string()))?;
        let id = self.collection_id().await?;

        let response = self
            .client
            .post(self.api(&Self::collection_path(id, "query")))
            .json(&json!({
                "query_embeddings": [embedding],
                "n_results": limit,
                "include": ["documents", "metadatas", "distances"]
            }))
            .send()
            .await
            .map_err(RagError::from)?;
        let result: QueryResponse = ensure_success(response, "Chroma query")
            .await?
            .json()
            .await
            .map_err(RagError::from)?;

        // One query embedding, so only the first row matters
        let documents = result.documents.into_iter().next().unwrap_or_default();
        let metadatas = result.metadatas.into_iter().next().unwrap_or_default();
        let distances = result.distances.into_iter().next().unwrap_or_default();

        let hits = documents
            .into_iter()
            .enumerate()
            .map(|(i, information)| {
                let title = metadatas
                    .get(i)
                    .and_then(|m| m.as_ref())
                    .and_then(|m| m.get("title"))
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string();
                let mut hit = ProductHit::new(title, information.unwrap_or_default());
                if let Some(Some(distance)) = distances.get(i) {
                    hit = hit.with_score(1.0 - distance);
                }
                hit
            })
            .collect();
        Ok(hits)
    }

    fn name(&self) -> &str {
        "chroma"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with_collection() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/collections"))
            .and(body_partial_json(json!({"name": "products", "get_or_create": true})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "c-1", "name": "products"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn store(server: &MockServer) -> ChromaStore {
        ChromaStore::new(ChromaConfig {
            endpoint: server.uri(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_collection_created_once() {
        let server = server_with_collection().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/collections/c-1/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(42)))
            .mount(&server)
            .await;

        let store = store(&server);
        store.ensure_ready().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_upsert_body() {
        let server = server_with_collection().await;
        let doc = ProductDocument {
            title: "Nokia 105".to_string(),
            information: "Tên sản phẩm: Nokia 105\n".to_string(),
        };
        Mock::given(method("POST"))
            .and(path("/api/v1/collections/c-1/upsert"))
            .and(body_json(json!({
                "ids": [document_id("Nokia 105")],
                "embeddings": [[0.5, 0.5]],
                "documents": ["Tên sản phẩm: Nokia 105\n"],
                "metadatas": [{"title": "Nokia 105"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        store(&server).insert(&doc, Some(&[0.5, 0.5])).await.unwrap();
    }

    #[tokio::test]
    async fn test_exists_filters_on_title() {
        let server = server_with_collection().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/collections/c-1/get"))
            .and(body_partial_json(json!({"where": {"title": "Nokia 105"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["x"]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/collections/c-1/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": []})))
            .with_priority(10)
            .mount(&server)
            .await;

        let store = store(&server);
        assert!(store.exists("Nokia 105").await.unwrap());
        assert!(!store.exists("Nokia 110").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_maps_distance_to_score() {
        let server = server_with_collection().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/collections/c-1/query"))
            .and(body_partial_json(json!({"n_results": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ids": [["a", "b"]],
                "documents": [["info A", "info B"]],
                "metadatas": [[{"title": "A"}, {"title": "B"}]],
                "distances": [[0.25, 0.5]]
            })))
            .mount(&server)
            .await;

        let hits = store(&server).search("", Some(&[1.0, 0.0]), 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "A");
        assert_eq!(hits[0].information, "info A");
        assert_eq!(hits[0].score, Some(0.75));
        assert_eq!(hits[1].score, Some(0.5));
    }

    #[tokio::test]
    async fn test_error_status_surfaces_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/collections"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = store(&server).ensure_ready().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
