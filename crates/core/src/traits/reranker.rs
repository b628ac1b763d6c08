//! Passage reranking trait

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A passage score, pointing back into the input slice
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedPassage {
    pub index: usize,
    pub score: f32,
}

/// Reranker interface
#[async_trait]
pub trait Reranker: Send + Sync + 'static {
    /// Score `passages` against `query`, highest score first
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<RankedPassage>>;

    fn name(&self) -> &str;
}
