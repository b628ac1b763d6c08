//! Embedding providers
//!
//! - `OpenAIEmbedder`: `/embeddings` on any OpenAI-compatible API
//! - `OllamaEmbedder`: Ollama's `/api/embed`
//! - `HashEmbedder`: deterministic hashing, no model or network

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use sales_rag_config::constants::{endpoints, models, timeouts};
use sales_rag_config::{EmbeddingProvider, EmbeddingSettings};
use sales_rag_core::Embedder;

use crate::LlmError;

/// OpenAI embedding configuration
#[derive(Debug, Clone)]
pub struct OpenAIEmbeddingConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_dim: usize,
    pub timeout: Duration,
}

impl Default for OpenAIEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::OPENAI_API.to_string(),
            api_key: None,
            model: models::EMBEDDING.to_string(),
            embedding_dim: models::EMBEDDING_DIM,
            timeout: Duration::from_secs(timeouts::LLM_REQUEST_SECS),
        }
    }
}

impl From<&EmbeddingSettings> for OpenAIEmbeddingConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            endpoint: settings.resolved_endpoint(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            embedding_dim: settings.dim,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    One(&'a str),
    Many(&'a [String]),
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI embedder
pub struct OpenAIEmbedder {
    client: Client,
    config: OpenAIEmbeddingConfig,
}

impl OpenAIEmbedder {
    pub fn new(config: OpenAIEmbeddingConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn request(&self, input: EmbeddingInput<'_>) -> Result<Vec<Vec<f32>>, LlmError> {
        let url = format!("{}/embeddings", self.config.endpoint.trim_end_matches('/'));
        let request = OpenAIEmbeddingRequest {
            model: &self.config.model,
            input,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Embedding(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Embedding(format!(
                "OpenAI embedding failed: {} - {}",
                status, text
            )));
        }

        let mut parsed: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> sales_rag_core::Result<Vec<f32>> {
        let vectors = self.request(EmbeddingInput::One(text)).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Embedding("No embedding returned".to_string()))?;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> sales_rag_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.request(EmbeddingInput::Many(texts)).await?;
        if vectors.len() != texts.len() {
            return Err(LlmError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))
            .into());
        }
        Ok(vectors)
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Ollama embedding configuration
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub embedding_dim: usize,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::OLLAMA_DEFAULT.to_string(),
            model: models::OLLAMA_EMBEDDING.to_string(),
            embedding_dim: 768,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedder
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn request(&self, input: EmbeddingInput<'_>) -> Result<Vec<Vec<f32>>, LlmError> {
        let request = OllamaEmbedRequest {
            model: &self.config.model,
            input,
        };
        let url = format!("{}/api/embed", self.config.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Embedding(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Embedding(format!(
                "Ollama embedding failed: {} - {}",
                status, text
            )));
        }

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> sales_rag_core::Result<Vec<f32>> {
        let vector = self
            .request(EmbeddingInput::One(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Embedding("No embedding returned".to_string()))?;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> sales_rag_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.request(EmbeddingInput::Many(texts)).await?)
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Hash-based embedder for offline runs and tests
///
/// Lowercased words and their character trigrams are hashed into buckets,
/// then the vector is L2-normalised. Texts sharing words land close
/// together, which is enough for routing and retrieval smoke tests.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn bucket(&self, feature: &str) -> usize {
        // FNV-1a, stable across platforms and releases
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in feature.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dim as u64) as usize
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dim];
        let lowered = text.to_lowercase();

        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            embedding[self.bucket(word)] += 1.0;

            let chars: Vec<char> = word.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let gram: String = window.iter().collect();
                    embedding[self.bucket(&gram)] += 0.5;
                }
            }
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> sales_rag_core::Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        "hash"
    }
}

/// Build the embedder selected in settings
pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, LlmError> {
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbeddingProvider::OpenAI => {
            Arc::new(OpenAIEmbedder::new(OpenAIEmbeddingConfig::from(settings))?)
        }
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint: settings.resolved_endpoint(),
            model: settings.model.clone(),
            embedding_dim: settings.dim,
        })),
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(settings.dim)),
    };

    tracing::info!(
        provider = ?settings.provider,
        model = embedder.model_name(),
        dim = embedder.dim(),
        "Embedder ready"
    );
    Ok(embedder)
}
