//! Default values shared across crates
//!
//! Settings defaults, store clients and tests all read from here so a
//! value only has to change in one place.

/// Service endpoints
pub mod endpoints {
    /// OpenAI-compatible API base
    pub const OPENAI_API: &str = "https://api.openai.com/v1";

    /// Local Ollama server
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Qdrant gRPC endpoint
    pub const QDRANT_DEFAULT: &str = "http://localhost:6334";

    /// Chroma HTTP server
    pub const CHROMA_DEFAULT: &str = "http://localhost:8123";

    /// Elasticsearch HTTP endpoint
    pub const ELASTICSEARCH_DEFAULT: &str = "http://localhost:9200";
}

/// Model names
pub mod models {
    pub const CHAT: &str = "gpt-4o-mini";
    pub const EMBEDDING: &str = "text-embedding-3-small";
    /// Output size of `text-embedding-3-small`
    pub const EMBEDDING_DIM: usize = 1536;
    pub const OLLAMA_EMBEDDING: &str = "nomic-embed-text";
}

/// Retrieval defaults
pub mod rag {
    pub const COLLECTION: &str = "products";
    pub const DEFAULT_TOP_K: usize = 5;
    /// Hits fetched before reranking
    pub const DEFAULT_RERANK_CANDIDATES: usize = 7;
    /// Hits fed to the one-shot `ask` prompt
    pub const DEFAULT_ASK_LIMIT: usize = 7;
    pub const SUPABASE_MATCH_FUNCTION: &str = "match_products";
    pub const MONGODB_DATABASE: &str = "vector_db";
    pub const MONGODB_VECTOR_INDEX: &str = "vector_index";
    /// Candidates scanned by `$vectorSearch` before `limit` is applied
    pub const MONGODB_NUM_CANDIDATES: u32 = 100;
}

/// Semantic routing
pub mod router {
    pub const PRODUCTS: &str = "products";
    pub const CHITCHAT: &str = "chitchat";
    pub const UNCERTAIN: &str = "uncertain";
    pub const DEFAULT_THRESHOLD: f32 = 0.4;
}

/// Conversation handling
pub mod conversation {
    /// Dialogue messages fed to the query rewriter
    pub const HISTORY_WINDOW: usize = 10;
}

/// Timeouts and retries
pub mod timeouts {
    pub const LLM_REQUEST_SECS: u64 = 60;
    pub const STORE_REQUEST_SECS: u64 = 30;
    pub const LLM_MAX_RETRIES: u32 = 3;
    pub const LLM_INITIAL_BACKOFF_MS: u64 = 500;
}

/// HTTP server
pub mod server {
    pub const DEFAULT_PORT: u16 = 8000;
    pub const MAX_SESSIONS: usize = 1000;
    pub const SESSION_TIMEOUT_SECS: u64 = 3600;
}
