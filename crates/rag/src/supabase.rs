//! Supabase (PostgREST + pgvector) product store
//!
//! Expects a table and a similarity function along these lines:
//!
//! ```sql
//! create extension if not exists vector;
//!
//! create table products (
//!   id bigserial primary key,
//!   title text not null unique,
//!   information text not null,
//!   embedding vector(1536)
//! );
//!
//! create or replace function match_products(query_embedding vector(1536), match_count int)
//! returns table (title text, information text, similarity float)
//! language sql stable as $$
//!   select title, information, 1 - (embedding <=> query_embedding) as similarity
//!   from products
//!   order by embedding <=> query_embedding
//!   limit match_count;
//! $$;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use serde::{Deserialize, Serialize};
use serde_json::json;

use sales_rag_config::constants::{rag, timeouts};
use sales_rag_config::Settings;
use sales_rag_core::{ProductDocument, ProductHit, ProductStore, StoreKind};

use crate::{ensure_success, RagError};

/// Supabase configuration
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Service or anon key
    pub key: String,
    pub table: String,
    pub match_function: String,
    pub timeout: Duration,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            table: rag::COLLECTION.to_string(),
            match_function: rag::SUPABASE_MATCH_FUNCTION.to_string(),
            timeout: Duration::from_secs(timeouts::STORE_REQUEST_SECS),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, RagError> {
        let supabase = &settings.store.supabase;
        let url = supabase
            .url
            .clone()
            .ok_or_else(|| RagError::Connection("SUPABASE_URL is not set".to_string()))?;
        let key = supabase
            .key
            .clone()
            .ok_or_else(|| RagError::Connection("SUPABASE_KEY is not set".to_string()))?;

        Ok(Self {
            table: settings.store.collection.clone(),
            match_function: supabase.match_function.clone(),
            timeout: Duration::from_secs(settings.store.timeout_secs),
            ..Self::new(url, key)
        })
    }
}

#[derive(Serialize)]
struct ProductRow<'a> {
    title: &'a str,
    information: &'a str,
    embedding: &'a [f32],
}

#[derive(Deserialize)]
struct MatchRow {
    title: String,
    information: String,
    #[serde(default)]
    similarity: Option<f32>,
}

/// Total from a `Content-Range` header like `0-24/3573` or `*/0`
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

/// PostgREST-backed product store
pub struct SupabaseStore {
    client: reqwest::Client,
    config: SupabaseConfig,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self, RagError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.key)
            .map_err(|e| RagError::Connection(format!("Invalid Supabase key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.key))
            .map_err(|e| RagError::Connection(format!("Invalid Supabase key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn rest(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ProductStore for SupabaseStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Vector
    }

    /// The table is managed by migrations; nothing to create here
    async fn ensure_ready(&self) -> sales_rag_core::Result<()> {
        Ok(())
    }

    async fn count(&self) -> sales_rag_core::Result<u64> {
        let response = self
            .client
            .get(self.rest(&self.config.table))
            .query(&[("select", "title"), ("limit", "1")])
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(RagError::from)?;
        let response = ensure_success(response, "Supabase count").await?;

        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                RagError::VectorStore("Supabase count: missing Content-Range total".to_string())
            })?;
        Ok(total)
    }

    async fn exists(&self, title: &str) -> sales_rag_core::Result<bool> {
        let filter = format!("eq.{}", title);
        let response = self
            .client
            .get(self.rest(&self.config.table))
            .query(&[("select", "title"), ("title", filter.as_str()), ("limit", "1")])
            .send()
            .await
            .map_err(RagError::from)?;
        let rows: Vec<serde_json::Value> = ensure_success(response, "Supabase select")
            .await?
            .json()
            .await
            .map_err(RagError::from)?;
        Ok(!rows.is_empty())
    }

    async fn insert(
        &self,
        doc: &ProductDocument,
        embedding: Option<&[f32]>,
    ) -> sales_rag_core::Result<()> {
        let embedding = embedding.ok_or_else(|| {
            RagError::VectorStore("Supabase insert requires an embedding".to_string())
        })?;

        // Upsert on the unique title so re-ingesting replaces the row
        let response = self
            .client
            .post(self.rest(&self.config.table))
            .query(&[("on_conflict", "title")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&ProductRow {
                title: &doc.title,
                information: &doc.information,
                embedding,
            })
            .send()
            .await
            .map_err(RagError::from)?;
        ensure_success(response, "Supabase insert").await?;
        Ok(())
    }

    async fn search(
        &self,
        _text: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> sales_rag_core::Result<Vec<ProductHit>> {
        let embedding = embedding
            .ok_or_else(|| RagError::Search("Supabase search requires an embedding".to_string()))?;

        let response = self
            .client
            .post(self.rest(&format!("rpc/{}", self.config.match_function)))
            .json(&json!({
                "query_embedding": embedding,
                "match_count": limit,
            }))
            .send()
            .await
            .map_err(RagError::from)?;
        let rows: Vec<MatchRow> = ensure_success(response, "Supabase match")
            .await?
            .json()
            .await
            .map_err(RagError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let hit = ProductHit::new(row.title, row.information);
                match row.similarity {
                    Some(score) => hit.with_score(score),
                    None => hit,
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "supabase"
    }
}
