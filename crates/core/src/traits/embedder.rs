//! Embedding trait

use crate::Result;
use async_trait::async_trait;

/// Text embedding provider
///
/// # Example
///
/// ```ignore
/// let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(config)?);
/// let vector = embedder.embed_query("iphone 15 giá bao nhiêu").await?;
/// assert_eq!(vector.len(), embedder.dim());
/// ```
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embed a document passage
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a search query
    ///
    /// Providers that use asymmetric prefixes override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// Embed several passages, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Output dimension
    fn dim(&self) -> usize;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
