//! In-process vector store
//!
//! Brute-force cosine search over a vector of documents. Useful for tests,
//! offline demos and catalogs small enough that a database is overkill.

use async_trait::async_trait;
use parking_lot::RwLock;

use sales_rag_core::{ProductDocument, ProductHit, ProductStore, StoreKind};

use crate::{cosine_similarity, RagError};

struct Entry {
    doc: ProductDocument,
    embedding: Vec<f32>,
}

/// In-memory product store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Titles in insertion order
    pub fn titles(&self) -> Vec<String> {
        self.entries.read().iter().map(|e| e.doc.title.clone()).collect()
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Vector
    }

    async fn ensure_ready(&self) -> sales_rag_core::Result<()> {
        Ok(())
    }

    async fn count(&self) -> sales_rag_core::Result<u64> {
        Ok(self.len() as u64)
    }

    async fn exists(&self, title: &str) -> sales_rag_core::Result<bool> {
        Ok(self.entries.read().iter().any(|e| e.doc.title == title))
    }

    async fn insert(
        &self,
        doc: &ProductDocument,
        embedding: Option<&[f32]>,
    ) -> sales_rag_core::Result<()> {
        let embedding = embedding
            .ok_or_else(|| RagError::VectorStore("Memory store requires an embedding".to_string()))?
            .to_vec();

        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.doc.title == doc.title) {
            Some(existing) => {
                existing.doc = doc.clone();
                existing.embedding = embedding;
            }
            None => entries.push(Entry {
                doc: doc.clone(),
                embedding,
            }),
        }
        Ok(())
    }

    async fn search(
        &self,
        _text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> sales_rag_core::Result<Vec<ProductHit>> {
        let query = embedding
            .ok_or_else(|| RagError::Search("Memory store search requires an embedding".to_string()))?;

        let entries = self.entries.read();
        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .map(|e| (cosine_similarity(query, &e.embedding), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, e)| {
                ProductHit::new(e.doc.title.clone(), e.doc.information.clone()).with_score(score)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
