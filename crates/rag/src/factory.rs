//! Build stores and rerankers from settings

use std::sync::Arc;

use sales_rag_config::{RerankerKind, RetrievalSettings, Settings, StoreBackend};
use sales_rag_core::{ProductStore, Reranker};

use crate::{
    ChromaConfig, ChromaStore, ElasticsearchConfig, ElasticsearchIndex, HttpReranker,
    KeywordIndex, KeywordIndexConfig, KeywordReranker, MemoryStore, MongoConfig, MongoStore,
    QdrantStore, RagError, SupabaseConfig, SupabaseStore, VectorStoreConfig,
};

/// Store selected by `store.backend`
pub fn create_store(settings: &Settings) -> Result<Arc<dyn ProductStore>, RagError> {
    let store: Arc<dyn ProductStore> = match settings.store.backend {
        StoreBackend::Qdrant => Arc::new(QdrantStore::new(VectorStoreConfig::from(settings))?),
        StoreBackend::Mongodb => {
            Arc::new(MongoStore::new(MongoConfig::from_settings(settings)?)?)
        }
        StoreBackend::Chroma => Arc::new(ChromaStore::new(ChromaConfig::from(settings))?),
        StoreBackend::Supabase => {
            Arc::new(SupabaseStore::new(SupabaseConfig::from_settings(settings)?)?)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Elasticsearch => {
            Arc::new(ElasticsearchIndex::new(ElasticsearchConfig::from(settings))?)
        }
        StoreBackend::Tantivy => Arc::new(KeywordIndex::new(KeywordIndexConfig::from(
            &settings.store.tantivy,
        ))?),
    };

    tracing::info!(
        backend = settings.store.backend.as_str(),
        kind = ?store.kind(),
        collection = %settings.store.collection,
        "Product store ready"
    );
    Ok(store)
}

/// Reranker selected by `retrieval.reranker`, `None` when disabled
pub fn create_reranker(
    settings: &RetrievalSettings,
) -> Result<Option<Arc<dyn Reranker>>, RagError> {
    let reranker: Arc<dyn Reranker> = match settings.reranker {
        RerankerKind::None => return Ok(None),
        RerankerKind::Keyword => Arc::new(KeywordReranker::new()),
        RerankerKind::Http => {
            let endpoint = settings.rerank_endpoint.as_deref().ok_or_else(|| {
                RagError::Reranker("retrieval.rerank_endpoint is not set".to_string())
            })?;
            Arc::new(HttpReranker::new(endpoint)?)
        }
    };

    tracing::info!(reranker = reranker.name(), "Reranker ready");
    Ok(Some(reranker))
}
