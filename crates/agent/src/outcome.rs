//! Turn results

use serde::Serialize;

use sales_rag_core::{Conversation, ProductHit};

/// Result of one conversation turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The query could not be routed; the conversation is untouched
    Clarify { message: String },
    /// The model answered and both messages were appended
    Answered {
        route: String,
        rewritten_query: String,
        hits: Vec<ProductHit>,
        reply: String,
    },
}

impl TurnOutcome {
    /// Text shown to the customer
    pub fn reply(&self) -> &str {
        match self {
            TurnOutcome::Clarify { message } => message,
            TurnOutcome::Answered { reply, .. } => reply,
        }
    }

    pub fn route(&self) -> &str {
        match self {
            TurnOutcome::Clarify { .. } => sales_rag_config::constants::router::UNCERTAIN,
            TurnOutcome::Answered { route, .. } => route,
        }
    }

    pub fn hits(&self) -> &[ProductHit] {
        match self {
            TurnOutcome::Clarify { .. } => &[],
            TurnOutcome::Answered { hits, .. } => hits,
        }
    }
}

/// What a turn will do once routed
#[derive(Debug)]
pub enum TurnPlan {
    /// Nothing was changed; reply with the clarification text
    Clarify { message: String },
    /// The user message is recorded and the model still has to answer
    Answer(PendingAnswer),
}

/// A routed turn waiting for its completion
#[derive(Debug)]
pub struct PendingAnswer {
    pub(crate) route: String,
    pub(crate) rewritten_query: String,
    pub(crate) hits: Vec<ProductHit>,
    pub(crate) snapshot: Conversation,
}

impl PendingAnswer {
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn rewritten_query(&self) -> &str {
        &self.rewritten_query
    }

    pub fn hits(&self) -> &[ProductHit] {
        &self.hits
    }
}

/// Result of a one-shot question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskOutcome {
    pub prompt: String,
    pub hits: Vec<ProductHit>,
    pub reply: String,
}
