//! Retrieval for the sales assistant
//!
//! Features:
//! - Product catalog loading from CSV
//! - Product stores: Qdrant, MongoDB Atlas, Chroma, Supabase, in-memory
//!   (vector) and Elasticsearch, Tantivy (keyword)
//! - Idempotent ingestion
//! - Semantic routing by embedding similarity
//! - Keyword and HTTP rerankers
//! - Product retriever with context building

pub mod catalog;
pub mod chroma;
pub mod elasticsearch;
pub mod factory;
pub mod ingest;
pub mod memory_store;
pub mod mongo;
pub mod reranker;
pub mod retriever;
pub mod router;
pub mod sparse_search;
pub mod supabase;
pub mod vector_store;

pub use catalog::load_products;
pub use chroma::{ChromaConfig, ChromaStore};
pub use elasticsearch::{ElasticsearchConfig, ElasticsearchIndex};
pub use factory::{create_reranker, create_store};
pub use ingest::{IngestMode, IngestReport, Ingestor};
pub use memory_store::MemoryStore;
pub use mongo::{MongoConfig, MongoStore};
pub use reranker::{HttpReranker, KeywordReranker};
pub use retriever::{build_context, ProductRetriever, RetrieverConfig};
pub use router::{Route, RouteDecision, SemanticRouter};
pub use sparse_search::{KeywordIndex, KeywordIndexConfig};
pub use supabase::{SupabaseConfig, SupabaseStore};
pub use vector_store::{QdrantStore, VectorDistance, VectorStoreConfig};

use thiserror::Error;
use uuid::Uuid;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Connection(err.to_string())
    }
}

impl From<RagError> for sales_rag_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Embedding(msg) => sales_rag_core::Error::Embedding(msg),
            RagError::Reranker(msg) => sales_rag_core::Error::Rerank(msg),
            RagError::Catalog(msg) => sales_rag_core::Error::InvalidInput(msg),
            other => sales_rag_core::Error::Store(other.to_string()),
        }
    }
}

/// Stable document id derived from the product title
///
/// Re-inserting the same title overwrites instead of duplicating.
pub fn document_id(title: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, title.as_bytes()).to_string()
}

/// Fail with the response status and body on non-2xx
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, RagError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RagError::VectorStore(format!("{} failed: {} - {}", context, status, body)))
}

/// Cosine similarity, 0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
