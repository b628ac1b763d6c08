//! Product retriever
//!
//! Embeds the query when the store needs a vector, searches, optionally
//! reranks and trims to `top_k`.

use std::sync::Arc;

use sales_rag_config::constants::rag;
use sales_rag_config::RetrievalSettings;
use sales_rag_core::{Embedder, ProductHit, ProductStore, Reranker, StoreKind};

use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Passages returned
    pub top_k: usize,
    /// Hits fetched before reranking
    pub rerank_candidates: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: rag::DEFAULT_TOP_K,
            rerank_candidates: rag::DEFAULT_RERANK_CANDIDATES,
        }
    }
}

impl From<&RetrievalSettings> for RetrieverConfig {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            top_k: settings.top_k,
            rerank_candidates: settings.rerank_candidates,
        }
    }
}

/// Store search plus optional reranking
pub struct ProductRetriever {
    store: Arc<dyn ProductStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrieverConfig,
}

impl ProductRetriever {
    pub fn new(
        store: Arc<dyn ProductStore>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ProductStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Raw store search, no reranking
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ProductHit>, RagError> {
        let embedding = match self.store.kind() {
            StoreKind::Vector => Some(
                self.embedder
                    .embed_query(query)
                    .await
                    .map_err(|e| RagError::Embedding(e.to_string()))?,
            ),
            StoreKind::Keyword => None,
        };

        self.store
            .search(query, embedding.as_deref(), limit)
            .await
            .map_err(|e| RagError::Search(e.to_string()))
    }

    /// Top-k hits for a query
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ProductHit>, RagError> {
        let Some(reranker) = self.reranker.as_ref() else {
            let hits = self.search(query, self.config.top_k).await?;
            tracing::debug!(query, hits = hits.len(), store = self.store.name(), "Retrieved");
            return Ok(hits);
        };

        let candidates = self
            .search(query, self.config.rerank_candidates.max(self.config.top_k))
            .await?;
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let passages: Vec<String> = candidates.iter().map(|h| h.information.clone()).collect();
        let ranked = reranker
            .rerank(query, &passages)
            .await
            .map_err(|e| RagError::Reranker(e.to_string()))?;

        let mut slots: Vec<Option<ProductHit>> = candidates.into_iter().map(Some).collect();
        let mut hits = Vec::with_capacity(self.config.top_k);
        for passage in ranked {
            if hits.len() == self.config.top_k {
                break;
            }
            if let Some(mut hit) = slots.get_mut(passage.index).and_then(Option::take) {
                hit.rerank_score = Some(passage.score);
                hits.push(hit);
            }
        }

        tracing::debug!(
            query,
            candidates = passages.len(),
            hits = hits.len(),
            reranker = reranker.name(),
            "Retrieved and reranked"
        );
        Ok(hits)
    }
}

/// Hit information blocks joined by newlines
pub fn build_context(hits: &[ProductHit]) -> String {
    hits.iter()
        .map(|h| h.information.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
