//! LLM integration for the sales assistant
//!
//! Features:
//! - OpenAI-compatible chat completions, streamed over SSE, with retry
//! - Embedding providers (OpenAI, Ollama, offline hashing)
//! - Query rewriting from conversation history

pub mod backend;
pub mod embeddings;
pub mod reflection;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use embeddings::{
    create_embedder, HashEmbedder, OllamaEmbedder, OpenAIEmbedder, OpenAIEmbeddingConfig,
};
pub use reflection::Reflection;

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for sales_rag_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Embedding(msg) => sales_rag_core::Error::Embedding(msg),
            LlmError::Configuration(msg) => sales_rag_core::Error::Config(msg),
            other => sales_rag_core::Error::Llm(other.to_string()),
        }
    }
}
