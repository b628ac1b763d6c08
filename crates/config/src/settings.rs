//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{conversation, endpoints, models, rag, router, server, timeouts};
use crate::prompts;
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerSettings,

    /// Chat completion backend
    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    /// Product store selection and connection details
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub retrieval: RetrievalSettings,

    #[serde(default)]
    pub router: RouterSettings,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub observability: ObservabilitySettings,

    #[serde(default)]
    pub catalog: CatalogSettings,
}

// ---------------------------------------------------------------------------
// server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins, empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle sessions older than this are dropped
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    server::DEFAULT_PORT
}

fn default_max_sessions() -> usize {
    server::MAX_SESSIONS
}

fn default_session_timeout() -> u64 {
    server::SESSION_TIMEOUT_SECS
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_sessions: default_max_sessions(),
            session_timeout_secs: default_session_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// llm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_openai_key", skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retries on network errors and 5xx responses
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_openai_endpoint() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| endpoints::OPENAI_API.to_string())
}

fn default_openai_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
}

fn default_chat_model() -> String {
    models::CHAT.to_string()
}

fn default_llm_timeout() -> u64 {
    timeouts::LLM_REQUEST_SECS
}

fn default_max_retries() -> u32 {
    timeouts::LLM_MAX_RETRIES
}

fn default_initial_backoff() -> u64 {
    timeouts::LLM_INITIAL_BACKOFF_MS
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_openai_endpoint(),
            api_key: default_openai_key(),
            model: default_chat_model(),
            temperature: None,
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

// ---------------------------------------------------------------------------
// embedding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAI,
    Ollama,
    /// Model-free hashing, for offline runs
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Overrides the provider's default endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_openai_key", skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dim")]
    pub dim: usize,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    models::EMBEDDING.to_string()
}

fn default_embedding_dim() -> usize {
    models::EMBEDDING_DIM
}

impl EmbeddingSettings {
    /// Endpoint to use, falling back to the provider default
    pub fn resolved_endpoint(&self) -> String {
        match (&self.endpoint, self.provider) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, EmbeddingProvider::Ollama) => endpoints::OLLAMA_DEFAULT.to_string(),
            (None, _) => default_openai_endpoint(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            endpoint: None,
            api_key: default_openai_key(),
            model: default_embedding_model(),
            dim: default_embedding_dim(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Qdrant,
    Mongodb,
    Chroma,
    Supabase,
    Memory,
    Elasticsearch,
    Tantivy,
}

impl StoreBackend {
    /// Keyword backends search text and never need embeddings
    pub fn is_keyword(&self) -> bool {
        matches!(self, Self::Elasticsearch | Self::Tantivy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qdrant => "qdrant",
            Self::Mongodb => "mongodb",
            Self::Chroma => "chroma",
            Self::Supabase => "supabase",
            Self::Memory => "memory",
            Self::Elasticsearch => "elasticsearch",
            Self::Tantivy => "tantivy",
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "mongodb" | "mongo" => Ok(Self::Mongodb),
            "chroma" | "chromadb" => Ok(Self::Chroma),
            "supabase" => Ok(Self::Supabase),
            "memory" => Ok(Self::Memory),
            "elasticsearch" | "es" => Ok(Self::Elasticsearch),
            "tantivy" => Ok(Self::Tantivy),
            other => Err(ConfigError::InvalidValue {
                field: "store.backend".to_string(),
                message: format!("Unknown store backend '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Collection, table or index name
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub qdrant: QdrantSettings,

    #[serde(default)]
    pub mongodb: MongoSettings,

    #[serde(default)]
    pub chroma: ChromaSettings,

    #[serde(default)]
    pub supabase: SupabaseSettings,

    #[serde(default)]
    pub elasticsearch: ElasticsearchSettings,

    #[serde(default)]
    pub tantivy: TantivySettings,
}

fn default_collection() -> String {
    rag::COLLECTION.to_string()
}

fn default_store_timeout() -> u64 {
    timeouts::STORE_REQUEST_SECS
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            collection: default_collection(),
            timeout_secs: default_store_timeout(),
            qdrant: QdrantSettings::default(),
            mongodb: MongoSettings::default(),
            chroma: ChromaSettings::default(),
            supabase: SupabaseSettings::default(),
            elasticsearch: ElasticsearchSettings::default(),
            tantivy: TantivySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantSettings {
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_qdrant_key", skip_serializing)]
    pub api_key: Option<String>,
}

fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| endpoints::QDRANT_DEFAULT.to_string())
}

fn default_qdrant_key() -> Option<String> {
    std::env::var("QDRANT_KEY").ok().filter(|k| !k.is_empty())
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: default_qdrant_key(),
        }
    }
}

/// MongoDB Atlas with a vector search index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSettings {
    #[serde(default = "default_mongodb_uri", skip_serializing)]
    pub uri: Option<String>,

    #[serde(default = "default_mongodb_database")]
    pub database: String,

    /// Atlas vector search index over `embedding`
    #[serde(default = "default_mongodb_index")]
    pub vector_index: String,

    #[serde(default = "default_mongodb_candidates")]
    pub num_candidates: u32,
}

fn default_mongodb_uri() -> Option<String> {
    std::env::var("MONGODB_URI").ok().filter(|u| !u.is_empty())
}

fn default_mongodb_database() -> String {
    rag::MONGODB_DATABASE.to_string()
}

fn default_mongodb_index() -> String {
    rag::MONGODB_VECTOR_INDEX.to_string()
}

fn default_mongodb_candidates() -> u32 {
    rag::MONGODB_NUM_CANDIDATES
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            uri: default_mongodb_uri(),
            database: default_mongodb_database(),
            vector_index: default_mongodb_index(),
            num_candidates: default_mongodb_candidates(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromaSettings {
    #[serde(default = "default_chroma_url")]
    pub url: String,
}

fn default_chroma_url() -> String {
    std::env::var("CHROMA_URL").unwrap_or_else(|_| endpoints::CHROMA_DEFAULT.to_string())
}

impl Default for ChromaSettings {
    fn default() -> Self {
        Self {
            url: default_chroma_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseSettings {
    #[serde(default = "default_supabase_url")]
    pub url: Option<String>,

    #[serde(default = "default_supabase_key", skip_serializing)]
    pub key: Option<String>,

    /// Postgres function used for similarity search
    #[serde(default = "default_match_function")]
    pub match_function: String,
}

fn default_supabase_url() -> Option<String> {
    std::env::var("SUPABASE_URL").ok().filter(|u| !u.is_empty())
}

fn default_supabase_key() -> Option<String> {
    std::env::var("SUPABASE_KEY").ok().filter(|k| !k.is_empty())
}

fn default_match_function() -> String {
    rag::SUPABASE_MATCH_FUNCTION.to_string()
}

impl Default for SupabaseSettings {
    fn default() -> Self {
        Self {
            url: default_supabase_url(),
            key: default_supabase_key(),
            match_function: default_match_function(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchSettings {
    #[serde(default = "default_elasticsearch_url")]
    pub url: String,
}

fn default_elasticsearch_url() -> String {
    std::env::var("ELASTICSEARCH_URL")
        .unwrap_or_else(|_| endpoints::ELASTICSEARCH_DEFAULT.to_string())
}

impl Default for ElasticsearchSettings {
    fn default() -> Self {
        Self {
            url: default_elasticsearch_url(),
        }
    }
}

/// Embedded keyword index
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TantivySettings {
    /// Index directory, in RAM when unset
    #[serde(default)]
    pub path: Option<String>,
}

// ---------------------------------------------------------------------------
// retrieval
// ---------------------------------------------------------------------------

/// How retrieved context is merged into the system message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Append every turn's context, the system message keeps growing
    #[default]
    Accumulate,
    /// Base prompt plus the latest context only
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RerankerKind {
    #[default]
    None,
    Keyword,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Passages kept for the prompt
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Hits fetched before reranking
    #[serde(default = "default_rerank_candidates")]
    pub rerank_candidates: usize,

    #[serde(default)]
    pub reranker: RerankerKind,

    /// Base URL of a `/rerank` service
    #[serde(default)]
    pub rerank_endpoint: Option<String>,

    #[serde(default)]
    pub context_mode: ContextMode,

    /// Hits used by the one-shot `ask` command
    #[serde(default = "default_ask_limit")]
    pub ask_limit: usize,
}

fn default_top_k() -> usize {
    rag::DEFAULT_TOP_K
}

fn default_rerank_candidates() -> usize {
    rag::DEFAULT_RERANK_CANDIDATES
}

fn default_ask_limit() -> usize {
    rag::DEFAULT_ASK_LIMIT
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rerank_candidates: default_rerank_candidates(),
            reranker: RerankerKind::default(),
            rerank_endpoint: None,
            context_mode: ContextMode::default(),
            ask_limit: default_ask_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// router
// ---------------------------------------------------------------------------

/// How per-sample similarities collapse into one route score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Nearest sample wins
    #[default]
    Max,
    /// Average over all samples of a route
    Mean,
}

/// A named route and its sample phrases
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSettings {
    pub name: String,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Minimum route score, below it the query is uncertain
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default)]
    pub aggregation: Aggregation,

    /// Declaration order breaks ties
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteSettings>,
}

fn default_threshold() -> f32 {
    router::DEFAULT_THRESHOLD
}

fn default_routes() -> Vec<RouteSettings> {
    vec![
        RouteSettings {
            name: router::PRODUCTS.to_string(),
            samples: prompts::to_owned(prompts::PRODUCT_SAMPLES),
        },
        RouteSettings {
            name: router::CHITCHAT.to_string(),
            samples: prompts::to_owned(prompts::CHITCHAT_SAMPLES),
        },
    ]
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            aggregation: Aggregation::default(),
            routes: default_routes(),
        }
    }
}

// ---------------------------------------------------------------------------
// agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Rewrite follow-up questions into standalone ones
    #[serde(default = "default_true")]
    pub rewrite_enabled: bool,

    /// Dialogue messages given to the rewriter
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_clarify_message")]
    pub clarify_message: String,
}

fn default_true() -> bool {
    true
}

fn default_history_window() -> usize {
    conversation::HISTORY_WINDOW
}

fn default_system_prompt() -> String {
    prompts::SYSTEM_PROMPT.to_string()
}

fn default_clarify_message() -> String {
    prompts::CLARIFY_MESSAGE.to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            rewrite_enabled: true,
            history_window: default_history_window(),
            system_prompt: default_system_prompt(),
            clarify_message: default_clarify_message(),
        }
    }
}

// ---------------------------------------------------------------------------
// observability / catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder and expose `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Product CSV file
    #[serde(default = "default_csv_path")]
    pub csv_path: String,
}

fn default_csv_path() -> String {
    "hoanghamobile.csv".to_string()
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// validation
// ---------------------------------------------------------------------------

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_store()?;
        self.validate_retrieval()?;
        self.validate_router()?;

        if self.agent.history_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.history_window".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "Max sessions must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.llm.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::InvalidValue {
                    field: "llm.temperature".to_string(),
                    message: format!("Must be between 0.0 and 2.0, got {}", t),
                });
            }
        }

        // Hosted OpenAI refuses anonymous calls
        let hosted = self.llm.endpoint.starts_with(endpoints::OPENAI_API);
        if self.environment.is_strict() && hosted && self.llm.api_key.is_none() {
            return Err(ConfigError::MissingField("llm.api_key".to_string()));
        }

        if self.embedding.dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.dim".to_string(),
                message: "Dimension must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn validate_store(&self) -> Result<(), ConfigError> {
        if self.store.collection.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.collection".to_string(),
                message: "Collection name cannot be empty".to_string(),
            });
        }

        if self.store.backend == StoreBackend::Mongodb && self.store.mongodb.uri.is_none() {
            return Err(ConfigError::MissingField("store.mongodb.uri".to_string()));
        }

        if self.store.backend == StoreBackend::Supabase {
            if self.store.supabase.url.is_none() {
                return Err(ConfigError::MissingField("store.supabase.url".to_string()));
            }
            if self.store.supabase.key.is_none() {
                return Err(ConfigError::MissingField("store.supabase.key".to_string()));
            }
        }

        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let retrieval = &self.retrieval;

        if retrieval.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.top_k".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if retrieval.rerank_candidates < retrieval.top_k {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.rerank_candidates".to_string(),
                message: format!(
                    "Must be >= top_k ({}), got {}",
                    retrieval.top_k, retrieval.rerank_candidates
                ),
            });
        }

        if retrieval.reranker == RerankerKind::Http && retrieval.rerank_endpoint.is_none() {
            return Err(ConfigError::MissingField(
                "retrieval.rerank_endpoint".to_string(),
            ));
        }

        if retrieval.ask_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.ask_limit".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn validate_router(&self) -> Result<(), ConfigError> {
        let threshold = self.router.threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                field: "router.threshold".to_string(),
                message: format!("Must be between -1.0 and 1.0, got {}", threshold),
            });
        }

        for route in &self.router.routes {
            if route.samples.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("router.routes.{}", route.name),
                    message: "Route needs at least one sample".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// `SALES_RAG_<SECTION>__<KEY>` variables
///
/// The prefix is joined with a single `_`; only nesting uses `__`.
fn env_overrides() -> Environment {
    Environment::with_prefix("SALES_RAG")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Load settings from files and environment
///
/// Sources, later ones winning: built-in defaults, `config/default`,
/// `config/{env}`, then `SALES_RAG_*` variables (`SALES_RAG_LLM__MODEL`
/// sets `llm.model`).
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(env_overrides());

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        environment = ?settings.environment,
        store = settings.store.backend.as_str(),
        model = %settings.llm.model,
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.retrieval.top_k, 5);
        assert_eq!(settings.retrieval.rerank_candidates, 7);
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.embedding.model, "text-embedding-3-small");
        assert_eq!(settings.store.collection, "products");
        assert_eq!(settings.router.aggregation, Aggregation::Max);
        assert_eq!(settings.retrieval.context_mode, ContextMode::Accumulate);
        assert!(settings.agent.rewrite_enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_routes() {
        let settings = Settings::default();
        let names: Vec<&str> = settings.router.routes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["products", "chitchat"]);
        assert!(settings.router.routes.iter().all(|r| !r.samples.is_empty()));
    }

    #[test]
    fn test_retrieval_validation() {
        let mut settings = Settings::default();
        settings.retrieval.top_k = 0;
        assert!(settings.validate().is_err());

        settings.retrieval.top_k = 8;
        settings.retrieval.rerank_candidates = 7;
        assert!(settings.validate().is_err());

        settings.retrieval.rerank_candidates = 8;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_http_reranker_needs_endpoint() {
        let mut settings = Settings::default();
        settings.retrieval.reranker = RerankerKind::Http;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(_))
        ));

        settings.retrieval.rerank_endpoint = Some("http://localhost:8080".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_router_threshold_range() {
        let mut settings = Settings::default();
        settings.router.threshold = 1.5;
        assert!(settings.validate().is_err());

        settings.router.threshold = -0.2;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_route_rejected() {
        let mut settings = Settings::default();
        settings.router.routes.push(RouteSettings {
            name: "empty".to_string(),
            samples: vec![],
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_strict_environment_requires_api_key() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.llm.endpoint = endpoints::OPENAI_API.to_string();
        settings.llm.api_key = None;
        assert!(settings.validate().is_err());

        settings.llm.api_key = Some("sk-test".to_string());
        assert!(settings.validate().is_ok());

        // Self-hosted endpoints may run without a key
        settings.llm.api_key = None;
        settings.llm.endpoint = "http://localhost:11434/v1".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_supabase_requires_credentials() {
        let mut settings = Settings::default();
        settings.store.backend = StoreBackend::Supabase;
        settings.store.supabase.url = None;
        assert!(settings.validate().is_err());

        settings.store.supabase.url = Some("https://x.supabase.co".to_string());
        settings.store.supabase.key = Some("anon".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_mongodb_requires_uri() {
        let mut settings = Settings::default();
        settings.store.backend = StoreBackend::Mongodb;
        settings.store.mongodb.uri = None;
        assert!(settings.validate().is_err());

        settings.store.mongodb.uri = Some("mongodb+srv://user:pw@cluster0.example.net".to_string());
        assert!(settings.validate().is_ok());
        assert_eq!(settings.store.mongodb.database, "vector_db");
        assert_eq!(settings.store.mongodb.num_candidates, 100);
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("qdrant".parse::<StoreBackend>().unwrap(), StoreBackend::Qdrant);
        assert_eq!("ChromaDB".parse::<StoreBackend>().unwrap(), StoreBackend::Chroma);
        assert_eq!("es".parse::<StoreBackend>().unwrap(), StoreBackend::Elasticsearch);
        assert_eq!("MongoDB".parse::<StoreBackend>().unwrap(), StoreBackend::Mongodb);
        assert!("mongo-atlas".parse::<StoreBackend>().is_err());
        assert!(StoreBackend::Tantivy.is_keyword());
        assert!(!StoreBackend::Memory.is_keyword());
    }

    #[test]
    fn test_embedding_endpoint_resolution() {
        let mut embedding = EmbeddingSettings {
            provider: EmbeddingProvider::Ollama,
            endpoint: None,
            ..Default::default()
        };
        assert_eq!(embedding.resolved_endpoint(), endpoints::OLLAMA_DEFAULT);

        embedding.endpoint = Some("http://embed:9000".to_string());
        assert_eq!(embedding.resolved_endpoint(), "http://embed:9000");
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let toml = r#"
            [store]
            backend = "tantivy"

            [retrieval]
            reranker = "keyword"
            context_mode = "replace"

            [router]
            aggregation = "mean"
            threshold = 0.6
        "#;
        let config = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();

        assert_eq!(settings.store.backend, StoreBackend::Tantivy);
        assert_eq!(settings.retrieval.reranker, RerankerKind::Keyword);
        assert_eq!(settings.retrieval.context_mode, ContextMode::Replace);
        assert_eq!(settings.router.aggregation, Aggregation::Mean);
        assert!((settings.router.threshold - 0.6).abs() < 1e-6);
        // Untouched sections keep their defaults
        assert_eq!(settings.retrieval.top_k, 5);
        assert_eq!(settings.router.routes.len(), 2);
    }

    #[test]
    fn test_env_override_names() {
        let mut vars = config::Map::new();
        vars.insert("SALES_RAG_LLM__MODEL".to_string(), "gpt-4o".to_string());
        vars.insert("SALES_RAG_RETRIEVAL__TOP_K".to_string(), "3".to_string());
        vars.insert("SALES_RAG_STORE__BACKEND".to_string(), "tantivy".to_string());

        let settings: Settings = Config::builder()
            .add_source(env_overrides().source(Some(vars)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.llm.model, "gpt-4o");
        assert_eq!(settings.retrieval.top_k, 3);
        assert_eq!(settings.store.backend, StoreBackend::Tantivy);
    }

    #[test]
    fn test_load_settings_reads_process_env() {
        // Only this test touches this variable
        std::env::set_var("SALES_RAG_AGENT__HISTORY_WINDOW", "4");
        let loaded = load_settings(None);
        std::env::remove_var("SALES_RAG_AGENT__HISTORY_WINDOW");

        let settings = loaded.unwrap();
        assert_eq!(settings.agent.history_window, 4);
    }

    #[test]
    fn test_load_from_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("default.toml"),
            "[server]\nport = 9100\n[retrieval]\ntop_k = 3\n",
        )
        .unwrap();

        let settings: Settings = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.retrieval.top_k, 3);
    }
}
