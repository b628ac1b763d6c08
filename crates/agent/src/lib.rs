//! Sales assistant agent
//!
//! One conversation turn is:
//! - rewrite the query into a standalone question (optional)
//! - route it: products, chitchat or uncertain
//! - for products, retrieve passages and merge them into the system message
//! - answer with the chat model, streamed or not
//!
//! Plus the one-shot `ask` flow that skips routing and history.

pub mod agent;
pub mod outcome;

pub use agent::{build_ask_prompt, AgentConfig, SalesAgent};
pub use outcome::{AskOutcome, PendingAnswer, TurnOutcome, TurnPlan};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Rewrite error: {0}")]
    Rewrite(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl From<sales_rag_llm::LlmError> for AgentError {
    fn from(err: sales_rag_llm::LlmError) -> Self {
        AgentError::Initialization(err.to_string())
    }
}

impl From<sales_rag_rag::RagError> for AgentError {
    fn from(err: sales_rag_rag::RagError) -> Self {
        AgentError::Retrieval(err.to_string())
    }
}

impl From<AgentError> for sales_rag_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Llm(msg) => sales_rag_core::Error::Llm(msg),
            other => sales_rag_core::Error::Agent(other.to_string()),
        }
    }
}
