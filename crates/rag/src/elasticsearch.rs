//! Elasticsearch keyword store
//!
//! Full-text `multi_match` over `title` and `information`. Query embeddings
//! are ignored.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use sales_rag_config::constants::{endpoints, rag, timeouts};
use sales_rag_config::Settings;
use sales_rag_core::{ProductDocument, ProductHit, ProductStore, StoreKind};

use crate::{document_id, ensure_success, RagError};

/// Elasticsearch configuration
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub endpoint: String,
    pub index: String,
    pub timeout: Duration,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::ELASTICSEARCH_DEFAULT.to_string(),
            index: rag::COLLECTION.to_string(),
            timeout: Duration::from_secs(timeouts::STORE_REQUEST_SECS),
        }
    }
}

impl From<&Settings> for ElasticsearchConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            endpoint: settings.store.elasticsearch.url.clone(),
            index: settings.store.collection.clone(),
            timeout: Duration::from_secs(settings.store.timeout_secs),
        }
    }
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: SourceDoc,
}

#[derive(Deserialize)]
struct SourceDoc {
    #[serde(default)]
    title: String,
    #[serde(default)]
    information: String,
}

/// Elasticsearch index of product documents
pub struct ElasticsearchIndex {
    client: reqwest::Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchIndex {
    pub fn new(config: ElasticsearchConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index,
            path
        )
    }

    async fn count_matching(&self, query: serde_json::Value) -> Result<u64, RagError> {
        let response = self
            .client
            .post(self.url("/_count"))
            .json(&json!({ "query": query }))
            .send()
            .await?;
        let count: CountResponse = ensure_success(response, "Elasticsearch count")
            .await?
            .json()
            .await?;
        Ok(count.count)
    }
}

#[async_trait]
impl ProductStore for ElasticsearchIndex {
    fn kind(&self) -> StoreKind {
        StoreKind::Keyword
    }

    async fn ensure_ready(&self) -> sales_rag_core::Result<()> {
        let response = self
            .client
            .head(self.url(""))
            .send()
            .await
            .map_err(RagError::from)?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            ensure_success(response, "Elasticsearch index check").await?;
            return Ok(());
        }

        let response = self
            .client
            .put(self.url(""))
            .json(&json!({
                "mappings": {
                    "properties": {
                        "title": {
                            "type": "text",
                            "fields": { "keyword": { "type": "keyword" } }
                        },
                        "information": { "type": "text" }
                    }
                }
            }))
            .send()
            .await
            .map_err(RagError::from)?;
        ensure_success(response, "Elasticsearch create index").await?;

        tracing::info!(index = %self.config.index, "Created Elasticsearch index");
        Ok(())
    }

    async fn count(&self) -> sales_rag_core::Result<u64> {
        Ok(self.count_matching(json!({ "match_all": {} })).await?)
    }

    async fn exists(&self, title: &str) -> sales_rag_core::Result<bool> {
        let count = self
            .count_matching(json!({ "term": { "title.keyword": title } }))
            .await?;
        Ok(count > 0)
    }

    async fn insert(
        &self,
        doc: &ProductDocument,
        _embedding: Option<&[f32]>,
    ) -> sales_rag_core::Result<()> {
        let response = self
            .client
            .put(self.url(&format!("/_doc/{}", document_id(&doc.title))))
            .query(&[("refresh", "true")])
            .json(&json!({
                "title": doc.title,
                "information": doc.information,
            }))
            .send()
            .await
            .map_err(RagError::from)?;
        ensure_success(response, "Elasticsearch index").await?;
        Ok(())
    }

    async fn search(
        &self,
        text: &str,
        _embedding: Option<&[f32]>,
        limit: usize,
    ) -> sales_rag_core::Result<Vec<ProductHit>> {
        let response = self
            .client
            .post(self.url("/_search"))
            .json(&json!({
                "size": limit,
                "query": {
                    "multi_match": {
                        "query": text,
                        "fields": ["title", "information"]
                    }
                }
            }))
            .send()
            .await
            .map_err(RagError::from)?;
        let result: SearchResponse = ensure_success(response, "Elasticsearch search")
            .await?
            .json()
            .await
            .map_err(RagError::from)?;

        Ok(result
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let product = ProductHit::new(hit.source.title, hit.source.information);
                match hit.score {
                    Some(score) => product.with_score(score),
                    None => product,
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "elasticsearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn index(server: &MockServer) -> ElasticsearchIndex {
        ElasticsearchIndex::new(ElasticsearchConfig {
            endpoint: server.uri(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_creates_missing_index() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/products"))
            .and(body_partial_json(json!({
                "mappings": {"properties": {"information": {"type": "text"}}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        index(&server).ensure_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_index_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        index(&server).ensure_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_uses_title_id() {
        let server = MockServer::start().await;
        let id = document_id("Nokia 105");
        Mock::given(method("PUT"))
            .and(path(format!("/products/_doc/{}", id)))
            .and(query_param("refresh", "true"))
            .and(body_json(json!({"title": "Nokia 105", "information": "info"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let doc = ProductDocument {
            title: "Nokia 105".to_string(),
            information: "info".to_string(),
        };
        index(&server).insert(&doc, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_count_and_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/products/_count"))
            .and(body_json(json!({"query": {"match_all": {}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 7})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/products/_count"))
            .and(body_json(json!({"query": {"term": {"title.keyword": "Nokia 105"}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 1})))
            .mount(&server)
            .await;

        let index = index(&server);
        assert_eq!(index.count().await.unwrap(), 7);
        assert!(index.exists("Nokia 105").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_multi_match() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/products/_search"))
            .and(body_json(json!({
                "size": 5,
                "query": {"multi_match": {"query": "pin trâu", "fields": ["title", "information"]}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"hits": [
                    {"_score": 3.5, "_source": {"title": "Nokia 105", "information": "Pin trâu"}}
                ]}
            })))
            .mount(&server)
            .await;

        let hits = index(&server).search("pin trâu", None, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Nokia 105");
        assert_eq!(hits[0].score, Some(3.5));
    }
}
