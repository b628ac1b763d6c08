//! Product store trait

use crate::{ProductDocument, ProductHit, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How a store matches queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Dense vector similarity, needs embeddings
    Vector,
    /// Full-text matching, ignores embeddings
    Keyword,
}

/// Storage and search over product documents
///
/// Implementations:
/// - `QdrantStore`, `ChromaStore`, `SupabaseStore`, `MemoryStore` (vector)
/// - `ElasticsearchIndex`, `KeywordIndex` (keyword)
///
/// # Example
///
/// ```ignore
/// let store: Arc<dyn ProductStore> = Arc::new(QdrantStore::new(config)?);
/// store.ensure_ready().await?;
/// if !store.exists("iPhone 15").await? {
///     store.insert(&doc, Some(&vector)).await?;
/// }
/// let hits = store.search("iphone 15", Some(&query_vector), 5).await?;
/// ```
#[async_trait]
pub trait ProductStore: Send + Sync + 'static {
    fn kind(&self) -> StoreKind;

    /// Create the collection or index if it does not exist
    async fn ensure_ready(&self) -> Result<()>;

    /// Number of stored documents
    async fn count(&self) -> Result<u64>;

    /// Whether a document with this exact title is stored
    async fn exists(&self, title: &str) -> Result<bool>;

    /// Store a document
    ///
    /// Vector stores require `embedding`. Keyword stores ignore it.
    async fn insert(&self, doc: &ProductDocument, embedding: Option<&[f32]>) -> Result<()>;

    /// Search for the `limit` best documents
    ///
    /// Vector stores use `embedding`. Keyword stores use `text`.
    async fn search(
        &self,
        text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<ProductHit>>;

    /// Store name for logging
    fn name(&self) -> &str;
}
