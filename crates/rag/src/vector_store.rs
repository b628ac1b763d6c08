//! Vector Store using Qdrant
//!
//! Dense vector storage and similarity search over product documents.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, Condition, CountPointsBuilder, CreateCollectionBuilder,
        CreateFieldIndexCollectionBuilder, Distance, FieldType, Filter, PointStruct,
        ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
    },
    Qdrant,
};

use sales_rag_config::constants::{endpoints, models, rag};
use sales_rag_config::Settings;
use sales_rag_core::{ProductDocument, ProductHit, ProductStore, StoreKind};

use crate::{document_id, RagError};

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    pub collection: String,
    pub vector_dim: usize,
    pub distance: VectorDistance,
    pub api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::QDRANT_DEFAULT.to_string(),
            collection: rag::COLLECTION.to_string(),
            vector_dim: models::EMBEDDING_DIM,
            distance: VectorDistance::Cosine,
            api_key: None,
        }
    }
}

impl From<&Settings> for VectorStoreConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            endpoint: settings.store.qdrant.url.clone(),
            collection: settings.store.collection.clone(),
            vector_dim: settings.embedding.dim,
            distance: VectorDistance::Cosine,
            api_key: settings.store.qdrant.api_key.clone(),
        }
    }
}

/// Distance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDistance {
    Cosine,
    Euclidean,
    DotProduct,
}

impl From<VectorDistance> for Distance {
    fn from(d: VectorDistance) -> Self {
        match d {
            VectorDistance::Cosine => Distance::Cosine,
            VectorDistance::Euclidean => Distance::Euclid,
            VectorDistance::DotProduct => Distance::Dot,
        }
    }
}

fn payload_for(doc: &ProductDocument) -> HashMap<String, Value> {
    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert("title".to_string(), doc.title.clone().into());
    payload.insert("information".to_string(), doc.information.clone().into());
    payload
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> String {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Qdrant-backed product store
pub struct QdrantStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl QdrantStore {
    /// Connect to Qdrant
    pub fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &VectorStoreConfig {
        &self.config
    }

    /// Create collection and title index if not exists
    async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                    VectorParamsBuilder::new(
                        self.config.vector_dim as u64,
                        Distance::from(self.config.distance),
                    ),
                ),
            )
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.config.collection,
                "title",
                FieldType::Keyword,
            ))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        tracing::info!(
            collection = %self.config.collection,
            dim = self.config.vector_dim,
            "Created Qdrant collection"
        );
        Ok(())
    }

    async fn upsert(&self, doc: &ProductDocument, embedding: &[f32]) -> Result<(), RagError> {
        if embedding.len() != self.config.vector_dim {
            return Err(RagError::VectorStore(format!(
                "Embedding has {} dimensions, collection expects {}",
                embedding.len(),
                self.config.vector_dim
            )));
        }

        let point = PointStruct::new(document_id(&doc.title), embedding.to_vec(), payload_for(doc));

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, vec![point]).wait(true))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(())
    }

    async fn search_vector(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ProductHit>, RagError> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(
                    &self.config.collection,
                    query_embedding.to_vec(),
                    limit as u64,
                )
                .with_payload(true),
            )
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| {
                ProductHit::new(
                    payload_string(&point.payload, "title"),
                    payload_string(&point.payload, "information"),
                )
                .with_score(point.score)
            })
            .collect())
    }

    async fn title_exists(&self, title: &str) -> Result<bool, RagError> {
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.config.collection)
                    .filter(Filter::must([Condition::matches("title", title.to_string())]))
                    .limit(1)
                    .with_payload(false),
            )
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(!response.result.is_empty())
    }

    async fn exact_count(&self) -> Result<u64, RagError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.config.collection).exact(true))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

#[async_trait]
impl ProductStore for QdrantStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Vector
    }

    async fn ensure_ready(&self) -> sales_rag_core::Result<()> {
        Ok(self.ensure_collection().await?)
    }

    async fn count(&self) -> sales_rag_core::Result<u64> {
        Ok(self.exact_count().await?)
    }

    async fn exists(&self, title: &str) -> sales_rag_core::Result<bool> {
        Ok(self.title_exists(title).await?)
    }

    async fn insert(
        &self,
        doc: &ProductDocument,
        embedding: Option<&[f32]>,
    ) -> sales_rag_core::Result<()> {
        let embedding = embedding.ok_or_else(|| {
            RagError::VectorStore("Qdrant insert requires an embedding".to_string())
        })?;
        Ok(self.upsert(doc, embedding).await?)
    }

    async fn search(
        &self,
        _text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> sales_rag_core::Result<Vec<ProductHit>> {
        let embedding = embedding
            .ok_or_else(|| RagError::Search("Qdrant search requires an embedding".to_string()))?;
        Ok(self.search_vector(embedding, limit).await?)
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
