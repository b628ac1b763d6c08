//! Query rewriting from conversation history
//!
//! Follow-ups like "máy đó còn màu nào?" only make sense with the previous
//! turns. The rewriter hands the recent dialogue to the chat model and asks
//! for a standalone question, which is what routing and retrieval see.

use std::sync::Arc;

use sales_rag_config::constants::conversation::HISTORY_WINDOW;
use sales_rag_config::prompts::{BOT_LABEL, CUSTOMER_LABEL, REWRITE_SYSTEM_PROMPT};
use sales_rag_core::{ChatModel, Conversation, Message, Result, Role};

/// Rewrites follow-up questions into standalone ones
pub struct Reflection {
    model: Arc<dyn ChatModel>,
    history_window: usize,
}

impl Reflection {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            history_window: HISTORY_WINDOW,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Render the last dialogue messages plus the new query, one per line
    pub fn render_history(&self, conversation: &Conversation, query: &str) -> String {
        let mut text = String::new();
        for message in conversation.history(self.history_window) {
            let label = match message.role {
                Role::User => CUSTOMER_LABEL,
                _ => BOT_LABEL,
            };
            text.push_str(label);
            text.push_str(": ");
            text.push_str(&message.content);
            text.push('\n');
        }
        text.push_str(CUSTOMER_LABEL);
        text.push_str(": ");
        text.push_str(query);
        text.push('\n');
        text
    }

    /// Standalone version of `query`
    ///
    /// An empty model reply falls back to the original query.
    pub async fn rewrite(&self, conversation: &Conversation, query: &str) -> Result<String> {
        let prompt = vec![
            Message::system(REWRITE_SYSTEM_PROMPT),
            Message::user(self.render_history(conversation, query)),
        ];

        let completion = self.model.complete(&prompt).await?;
        let rewritten = completion.text.trim();

        if rewritten.is_empty() {
            tracing::warn!(query, "Rewriter returned empty text, keeping original query");
            return Ok(query.to_string());
        }

        tracing::info!(original = query, rewritten, "Query rewritten");
        Ok(rewritten.to_string())
    }
}
