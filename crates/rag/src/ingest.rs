//! Catalog ingestion
//!
//! Pushes product documents into a store. Both modes are safe to re-run:
//! `IfEmpty` only fills an empty store, `MissingOnly` skips titles that
//! are already present.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use sales_rag_core::{Embedder, Product, ProductStore, StoreKind};

use crate::RagError;

/// Which products get inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Insert everything when the store is empty, otherwise nothing
    #[default]
    IfEmpty,
    /// Insert products whose title is not stored yet
    MissingOnly,
}

impl FromStr for IngestMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "if-empty" | "if_empty" => Ok(Self::IfEmpty),
            "missing-only" | "missing_only" => Ok(Self::MissingOnly),
            other => Err(RagError::Catalog(format!(
                "Unknown ingest mode '{}', expected if-empty or missing-only",
                other
            ))),
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IfEmpty => write!(f, "if-empty"),
            Self::MissingOnly => write!(f, "missing-only"),
        }
    }
}

/// Outcome of an ingest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Loads products into a store
pub struct Ingestor {
    store: Arc<dyn ProductStore>,
    embedder: Arc<dyn Embedder>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ProductStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub async fn run(&self, products: &[Product], mode: IngestMode) -> Result<IngestReport, RagError> {
        let total = products.len();
        let mut report = IngestReport {
            total,
            ..Default::default()
        };

        self.store
            .ensure_ready()
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if mode == IngestMode::IfEmpty {
            let count = self
                .store
                .count()
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
            if count > 0 {
                tracing::info!(
                    store = self.store.name(),
                    existing = count,
                    "Store already populated, skipping ingestion"
                );
                report.skipped = total;
                return Ok(report);
            }
        }

        for (i, product) in products.iter().enumerate() {
            if mode == IngestMode::MissingOnly
                && self
                    .store
                    .exists(&product.title)
                    .await
                    .map_err(|e| RagError::VectorStore(e.to_string()))?
            {
                tracing::debug!(title = %product.title, "Already stored, skipping");
                report.skipped += 1;
                continue;
            }

            let doc = product.to_document();
            let embedding = match self.store.kind() {
                StoreKind::Vector => Some(
                    self.embedder
                        .embed(&doc.information)
                        .await
                        .map_err(|e| RagError::Embedding(e.to_string()))?,
                ),
                StoreKind::Keyword => None,
            };

            self.store
                .insert(&doc, embedding.as_deref())
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;

            report.inserted += 1;
            metrics::counter!("sales_rag_ingested_total").increment(1);
            tracing::info!("Inserted document {}/{}: {}", i + 1, total, product.title);
        }

        tracing::info!(
            store = self.store.name(),
            mode = %mode,
            total = report.total,
            inserted = report.inserted,
            skipped = report.skipped,
            "Ingestion finished"
        );
        Ok(report)
    }
}
