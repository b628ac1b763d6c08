//! Passage rerankers
//!
//! Two implementations of [`Reranker`]:
//! - [`KeywordReranker`]: keyword-overlap scoring, no model, no network
//! - [`HttpReranker`]: TEI/Jina style `/rerank` service
//!
//! Both return passages ordered by descending score.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use sales_rag_config::constants::timeouts;
use sales_rag_core::{RankedPassage, Reranker};

use crate::RagError;

/// Common Vietnamese and English stopwords
const STOPWORDS: &[&str] = &[
    // Vietnamese
    "là", "và", "của", "có", "cho", "với", "các", "những", "được", "này", "đó", "thì", "mà",
    "ở", "trong", "không", "nào", "gì", "bao", "nhiêu", "em", "anh", "chị", "ạ", "ơi", "nhé",
    "vậy", "thế", "ko", "k", "còn", "muốn", "mua", "cần", "hỏi", "shop", "bên", "mình", "tôi",
    "một", "về", "đang", "sẽ", "đã", "rồi", "cái", "chiếc", "con", "máy", "loại",
    // English
    "the", "a", "an", "is", "are", "was", "be", "to", "of", "in", "for", "on", "with", "at",
    "by", "from", "as", "and", "or", "it", "this", "that", "what", "which", "how", "do", "does",
    "i", "you", "me", "my",
];

/// Keyword-overlap reranker
///
/// Scoring:
/// - term frequency: sqrt(count in passage) for diminishing returns
/// - specificity: log(1 + term length), longer terms weigh more
/// - position: earlier query terms weigh slightly more
/// - coverage bonus for passages matching more distinct query terms
#[derive(Debug, Clone)]
pub struct KeywordReranker {
    stopwords: HashSet<&'static str>,
}

impl Default for KeywordReranker {
    fn default() -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }
}

impl KeywordReranker {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.unicode_words().map(|w| w.to_lowercase()).collect()
    }

    /// Score in [0, 1)
    pub fn score(&self, query: &str, passage: &str) -> f32 {
        let mut seen = HashSet::new();
        let query_terms: Vec<String> = Self::tokenize(query)
            .into_iter()
            .filter(|w| !self.stopwords.contains(w.as_str()))
            .filter(|w| seen.insert(w.clone()))
            .collect();

        if query_terms.is_empty() {
            return 0.0;
        }

        let passage_words = Self::tokenize(passage);
        let passage_len = passage_words.len().max(1) as f32;
        let length_norm = 1.0 / (1.0 + (passage_len / 50.0).sqrt());

        let mut total = 0.0f32;
        let mut matched = 0usize;

        for (pos, term) in query_terms.iter().enumerate() {
            let tf = passage_words.iter().filter(|w| *w == term).count() as f32;
            if tf == 0.0 {
                continue;
            }
            matched += 1;

            let specificity = (1.0 + term.chars().count() as f32).ln();
            let position_weight = 1.0 / (1.0 + pos as f32 * 0.1);
            total += tf.sqrt() * specificity * position_weight * length_norm;
        }

        let coverage = matched as f32 / query_terms.len() as f32;
        let raw = total + coverage * 0.3;
        raw / (raw + 1.0)
    }
}

#[async_trait]
impl Reranker for KeywordReranker {
    async fn rerank(
        &self,
        query: &str,
        passages: &[String],
    ) -> sales_rag_core::Result<Vec<RankedPassage>> {
        let mut ranked: Vec<RankedPassage> = passages
            .iter()
            .enumerate()
            .map(|(index, passage)| RankedPassage {
                index,
                score: self.score(query, passage),
            })
            .collect();
        sort_ranked(&mut ranked);
        Ok(ranked)
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Highest score first, ties keep the original order
fn sort_ranked(ranked: &mut [RankedPassage]) {
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponseItem {
    index: usize,
    score: f32,
}

/// Client for a `/rerank` endpoint (text-embeddings-inference, Jina)
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReranker {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts::STORE_REQUEST_SECS))
            .build()
            .map_err(|e| RagError::Reranker(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn request(&self, query: &str, passages: &[String]) -> Result<Vec<RankedPassage>, RagError> {
        let response = self
            .client
            .post(format!("{}/rerank", self.endpoint))
            .json(&RerankRequest {
                query,
                texts: passages,
            })
            .send()
            .await
            .map_err(|e| RagError::Reranker(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Reranker(format!("HTTP {}: {}", status, body)));
        }

        let items: Vec<RerankResponseItem> = response
            .json()
            .await
            .map_err(|e| RagError::Reranker(format!("Invalid rerank response: {}", e)))?;

        let mut ranked = Vec::with_capacity(items.len());
        for item in items {
            if item.index >= passages.len() {
                return Err(RagError::Reranker(format!(
                    "Rerank index {} out of range for {} passages",
                    item.index,
                    passages.len()
                )));
            }
            ranked.push(RankedPassage {
                index: item.index,
                score: item.score,
            });
        }
        sort_ranked(&mut ranked);
        Ok(ranked)
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        passages: &[String],
    ) -> sales_rag_core::Result<Vec<RankedPassage>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.request(query, passages).await?)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_keyword_score() {
        let reranker = KeywordReranker::new();
        let relevant = reranker.score(
            "iPhone 15 giá bao nhiêu",
            "Tên sản phẩm: iPhone 15 128GB\nGiá: 19.990.000 ₫",
        );
        let unrelated = reranker.score(
            "iPhone 15 giá bao nhiêu",
            "Tên sản phẩm: Samsung Galaxy A15\nMàu sắc: Xanh",
        );
        assert!(relevant > unrelated);
        assert!(relevant < 1.0);
    }

    #[test]
    fn test_stopword_only_query() {
        let reranker = KeywordReranker::new();
        assert_eq!(reranker.score("có bao nhiêu", "có bao nhiêu máy"), 0.0);
    }

    #[tokio::test]
    async fn test_keyword_rerank_order() {
        let reranker = KeywordReranker::new();
        let passages = vec![
            "Tên sản phẩm: Nokia 105\nMô tả: Pin trâu".to_string(),
            "Tên sản phẩm: Samsung Galaxy S24\nMô tả: camera 200MP, Galaxy AI".to_string(),
        ];

        let ranked = reranker.rerank("samsung galaxy camera", &passages).await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].index, 1);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[tokio::test]
    async fn test_http_rerank() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .and(body_json(serde_json::json!({
                "query": "pin trâu",
                "texts": ["a", "b", "c"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"index": 2, "score": 0.9},
                {"index": 0, "score": 0.1},
                {"index": 1, "score": 0.5}
            ])))
            .mount(&server)
            .await;

        let reranker = HttpReranker::new(format!("{}/", server.uri())).unwrap();
        let passages = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ranked = reranker.rerank("pin trâu", &passages).await.unwrap();

        let order: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_http_rerank_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let reranker = HttpReranker::new(server.uri()).unwrap();
        let err = reranker
            .rerank("q", &["a".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_http_rerank_out_of_range() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"index": 5, "score": 0.9}])),
            )
            .mount(&server)
            .await;

        let reranker = HttpReranker::new(server.uri()).unwrap();
        assert!(reranker.rerank("q", &["a".to_string()]).await.is_err());
    }
}
