//! MongoDB Atlas product store
//!
//! Documents are `{_id, title, information, embedding}` in one collection.
//! Search runs `$vectorSearch`, which needs an Atlas Vector Search index on
//! `embedding` (named `vector_index` by default):
//!
//! ```json
//! { "fields": [{ "type": "vector", "path": "embedding",
//!                "numDimensions": 1536, "similarity": "cosine" }] }
//! ```

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Collection};
use tokio::sync::OnceCell;

use sales_rag_config::constants::rag;
use sales_rag_config::Settings;
use sales_rag_core::{ProductDocument, ProductHit, ProductStore, StoreKind};

use crate::{document_id, RagError};

/// MongoDB configuration
#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// Connection string, `mongodb+srv://...` for Atlas
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub vector_index: String,
    pub num_candidates: u32,
}

impl MongoConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: rag::MONGODB_DATABASE.to_string(),
            collection: rag::COLLECTION.to_string(),
            vector_index: rag::MONGODB_VECTOR_INDEX.to_string(),
            num_candidates: rag::MONGODB_NUM_CANDIDATES,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, RagError> {
        let mongo = &settings.store.mongodb;
        let uri = mongo
            .uri
            .clone()
            .ok_or_else(|| RagError::Connection("MONGODB_URI is not set".to_string()))?;

        Ok(Self {
            database: mongo.database.clone(),
            collection: settings.store.collection.clone(),
            vector_index: mongo.vector_index.clone(),
            num_candidates: mongo.num_candidates,
            ..Self::new(uri)
        })
    }
}

fn mongo_error(context: &str, err: mongodb::error::Error) -> RagError {
    RagError::VectorStore(format!("MongoDB {} failed: {}", context, err))
}

/// Document stored for one product
fn product_document(doc: &ProductDocument, embedding: &[f32]) -> Document {
    let vector: Vec<f64> = embedding.iter().map(|v| f64::from(*v)).collect();
    doc! {
        "_id": document_id(&doc.title),
        "title": &doc.title,
        "information": &doc.information,
        "embedding": vector,
    }
}

/// `$vectorSearch` followed by a projection that keeps the score
fn vector_search_pipeline(
    embedding: &[f32],
    limit: usize,
    index: &str,
    num_candidates: u32,
) -> Vec<Document> {
    let vector: Vec<f64> = embedding.iter().map(|v| f64::from(*v)).collect();
    // Atlas rejects numCandidates below limit
    let candidates = i64::from(num_candidates).max(limit as i64);
    vec![
        doc! {
            "$vectorSearch": {
                "index": index,
                "path": "embedding",
                "queryVector": vector,
                "numCandidates": candidates,
                "limit": limit as i64,
            }
        },
        doc! {
            "$project": {
                "_id": 0,
                "title": 1,
                "information": 1,
                "score": { "$meta": "vectorSearchScore" },
            }
        },
    ]
}

fn hit_from_document(document: &Document) -> ProductHit {
    let text = |key: &str| document.get_str(key).unwrap_or_default().to_string();
    let score = match document.get("score") {
        Some(Bson::Double(v)) => Some(*v as f32),
        Some(Bson::Int32(v)) => Some(*v as f32),
        _ => None,
    };
    ProductHit {
        score,
        ..ProductHit::new(text("title"), text("information"))
    }
}

/// MongoDB Atlas store
pub struct MongoStore {
    config: MongoConfig,
    collection: OnceCell<Collection<Document>>,
}

impl MongoStore {
    /// The connection is opened on first use
    pub fn new(config: MongoConfig) -> Result<Self, RagError> {
        if config.uri.trim().is_empty() {
            return Err(RagError::Connection("MongoDB URI is empty".to_string()));
        }
        Ok(Self {
            config,
            collection: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    async fn collection(&self) -> Result<&Collection<Document>, RagError> {
        self.collection
            .get_or_try_init(|| async {
                let client = Client::with_uri_str(&self.config.uri)
                    .await
                    .map_err(|e| RagError::Connection(format!("MongoDB connect failed: {}", e)))?;
                tracing::info!(
                    database = %self.config.database,
                    collection = %self.config.collection,
                    "Connected to MongoDB"
                );
                Ok(client
                    .database(&self.config.database)
                    .collection::<Document>(&self.config.collection))
            })
            .await
    }
}

#[async_trait]
impl ProductStore for MongoStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Vector
    }

    /// Collections are created on first insert; the search index is
    /// managed in Atlas
    async fn ensure_ready(&self) -> sales_rag_core::Result<()> {
        self.collection().await?;
        Ok(())
    }

    async fn count(&self) -> sales_rag_core::Result<u64> {
        let collection = self.collection().await?;
        let count = collection
            .count_documents(doc! {})
            .await
            .map_err(|e| mongo_error("count", e))?;
        Ok(count)
    }

    async fn exists(&self, title: &str) -> sales_rag_core::Result<bool> {
        let collection = self.collection().await?;
        let found = collection
            .find_one(doc! { "title": title })
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|e| mongo_error("find", e))?;
        Ok(found.is_some())
    }

    async fn insert(
        &self,
        doc: &ProductDocument,
        embedding: Option<&[f32]>,
    ) -> sales_rag_core::Result<()> {
        let embedding = embedding.ok_or_else(|| {
            RagError::VectorStore("MongoDB insert requires an embedding".to_string())
        })?;
        let collection = self.collection().await?;
        let document = product_document(doc, embedding);

        // Same title, same _id: re-inserting replaces the document
        collection
            .replace_one(doc! { "_id": document_id(&doc.title) }, document)
            .upsert(true)
            .await
            .map_err(|e| mongo_error("insert", e))?;
        Ok(())
    }

    async fn search(
        &self,
        _text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> sales_rag_core::Result<Vec<ProductHit>> {
        let embedding = embedding
            .ok_or_else(|| RagError::Search("MongoDB search requires an embedding".to_string()))?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let collection = self.collection().await?;
        let pipeline = vector_search_pipeline(
            embedding,
            limit,
            &self.config.vector_index,
            self.config.num_candidates,
        );
        let documents: Vec<Document> = collection
            .aggregate(pipeline)
            .await
            .map_err(|e| mongo_error("vector search", e))?
            .try_collect()
            .await
            .map_err(|e| mongo_error("vector search", e))?;

        Ok(documents.iter().map(hit_from_document).collect())
    }

    fn name(&self) -> &str {
        "mongodb"
    }
}
