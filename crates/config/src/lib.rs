//! Configuration management for the sales assistant
//!
//! Supports loading configuration from:
//! - TOML files (`config/default.toml`, `config/{env}.toml`)
//! - Environment variables (`SALES_RAG_` prefix, `__` between sections)
//! - Well-known provider variables (`OPENAI_API_KEY`, `MONGODB_URI`, `QDRANT_URL`, ...)
//!   used as defaults

pub mod constants;
pub mod prompts;
pub mod settings;

pub use settings::{
    load_settings, AgentSettings, Aggregation, CatalogSettings, ChromaSettings, ContextMode,
    ElasticsearchSettings, EmbeddingProvider, EmbeddingSettings, LlmSettings, MongoSettings,
    ObservabilitySettings, QdrantSettings, RerankerKind, RetrievalSettings, RouteSettings,
    RouterSettings, RuntimeEnvironment, ServerSettings, Settings, StoreBackend, StoreSettings,
    SupabaseSettings, TantivySettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for sales_rag_core::Error {
    fn from(err: ConfigError) -> Self {
        sales_rag_core::Error::Config(err.to_string())
    }
}
