//! Application state

use std::sync::Arc;
use std::time::Duration;

use sales_rag_agent::SalesAgent;
use sales_rag_config::Settings;

use crate::session::SessionManager;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub agent: Arc<SalesAgent>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: Settings, agent: SalesAgent) -> Self {
        let sessions = SessionManager::with_config(
            config.server.max_sessions,
            Duration::from_secs(config.server.session_timeout_secs),
            Duration::from_secs(60),
        );
        Self {
            config: Arc::new(config),
            agent: Arc::new(agent),
            sessions: Arc::new(sessions),
        }
    }
}
