//! Sales agent
//!
//! Owns the shared, read-only parts of the assistant (chat model, router,
//! retriever). Conversations are passed in per turn, so one agent can serve
//! any number of sessions.

use std::sync::Arc;

use tokio::sync::mpsc;

use sales_rag_config::constants::router::{PRODUCTS, UNCERTAIN};
use sales_rag_config::prompts::{ASK_FOOTER, ASK_HEADER, ASK_PASSAGE_LABEL};
use sales_rag_config::{ContextMode, Settings};
use sales_rag_core::{ChatModel, Conversation, FinishReason, Message, ProductHit};
use sales_rag_llm::{create_embedder, OpenAIBackend, OpenAIConfig, Reflection};
use sales_rag_rag::{
    build_context, create_reranker, create_store, ProductRetriever, RetrieverConfig,
    SemanticRouter,
};

use crate::outcome::{AskOutcome, PendingAnswer, TurnOutcome, TurnPlan};
use crate::AgentError;

/// Agent behaviour switches
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub rewrite_enabled: bool,
    pub history_window: usize,
    pub system_prompt: String,
    pub clarify_message: String,
    pub context_mode: ContextMode,
    /// Hits used by [`SalesAgent::ask`]
    pub ask_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for AgentConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            rewrite_enabled: settings.agent.rewrite_enabled,
            history_window: settings.agent.history_window,
            system_prompt: settings.agent.system_prompt.clone(),
            clarify_message: settings.agent.clarify_message.clone(),
            context_mode: settings.retrieval.context_mode,
            ask_limit: settings.retrieval.ask_limit,
        }
    }
}

/// Prompt for the one-shot question flow
pub fn build_ask_prompt(query: &str, hits: &[ProductHit]) -> String {
    let mut prompt = format!("{}\n{}\n\n", ASK_HEADER, query);
    for hit in hits {
        prompt.push_str(ASK_PASSAGE_LABEL);
        prompt.push(' ');
        prompt.push_str(&hit.information);
        prompt.push('\n');
    }
    prompt.push_str(ASK_FOOTER);
    prompt
}

/// Retrieval-augmented sales assistant
pub struct SalesAgent {
    model: Arc<dyn ChatModel>,
    reflection: Option<Reflection>,
    router: SemanticRouter,
    retriever: ProductRetriever,
    config: AgentConfig,
}

impl SalesAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        router: SemanticRouter,
        retriever: ProductRetriever,
        config: AgentConfig,
    ) -> Self {
        let reflection = config
            .rewrite_enabled
            .then(|| Reflection::new(model.clone()).with_history_window(config.history_window));

        Self {
            model,
            reflection,
            router,
            retriever,
            config,
        }
    }

    /// Wire every component from settings
    pub async fn from_settings(settings: &Settings) -> Result<Self, AgentError> {
        let model: Arc<dyn ChatModel> =
            Arc::new(OpenAIBackend::new(OpenAIConfig::from(&settings.llm))?);
        let embedder = create_embedder(&settings.embedding)?;
        let store = create_store(settings)?;
        let reranker = create_reranker(&settings.retrieval)?;

        let router = SemanticRouter::from_settings(embedder.clone(), &settings.router).await?;
        let retriever = ProductRetriever::new(
            store,
            embedder,
            reranker,
            RetrieverConfig::from(&settings.retrieval),
        );

        tracing::info!(
            model = model.model_name(),
            store = retriever.store().name(),
            rewrite = settings.agent.rewrite_enabled,
            "Sales agent ready"
        );

        Ok(Self::new(model, router, retriever, AgentConfig::from(settings)))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn retriever(&self) -> &ProductRetriever {
        &self.retriever
    }

    /// Fresh conversation seeded with the system prompt
    pub fn new_conversation(&self) -> Conversation {
        Conversation::new(self.config.system_prompt.clone())
    }

    /// Handle one customer message
    ///
    /// With `tokens` set, reply tokens are forwarded as they arrive. An
    /// uncertain route returns the clarification text without touching the
    /// conversation or calling the model. When the model call fails the
    /// conversation is restored to its state before the turn.
    pub async fn handle(
        &self,
        conversation: &mut Conversation,
        query: &str,
        tokens: Option<mpsc::Sender<String>>,
    ) -> Result<TurnOutcome, AgentError> {
        match self.begin_turn(conversation, query).await? {
            TurnPlan::Clarify { message } => Ok(TurnOutcome::Clarify { message }),
            TurnPlan::Answer(pending) => self.complete_turn(conversation, pending, tokens).await,
        }
    }

    /// First half of a turn: rewrite, route and, for products, retrieve
    ///
    /// On [`TurnPlan::Answer`] the user message (and any context) is already
    /// in the conversation. Callers that want to report the route before the
    /// reply streams use this with [`SalesAgent::complete_turn`].
    pub async fn begin_turn(
        &self,
        conversation: &mut Conversation,
        query: &str,
    ) -> Result<TurnPlan, AgentError> {
        let rewritten = match &self.reflection {
            Some(reflection) => reflection
                .rewrite(conversation, query)
                .await
                .map_err(|e| AgentError::Rewrite(e.to_string()))?,
            None => query.to_string(),
        };

        let decision = self
            .router
            .guide(&rewritten)
            .await
            .map_err(|e| AgentError::Routing(e.to_string()))?;

        metrics::counter!("sales_rag_turns_total", "route" => decision.name.clone()).increment(1);

        if decision.name == UNCERTAIN {
            tracing::info!(query, score = decision.score, "Asking customer to clarify");
            return Ok(TurnPlan::Clarify {
                message: self.config.clarify_message.clone(),
            });
        }

        let snapshot = conversation.clone();

        let hits = if decision.name == PRODUCTS {
            let hits = self.retriever.retrieve(&rewritten).await?;
            let context = build_context(&hits);
            match self.config.context_mode {
                ContextMode::Accumulate => conversation.append_context(&context),
                ContextMode::Replace => conversation.replace_context(&context),
            }
            conversation.push_user(rewritten.clone());
            hits
        } else {
            conversation.push_user(query);
            Vec::new()
        };

        Ok(TurnPlan::Answer(PendingAnswer {
            route: decision.name,
            rewritten_query: rewritten,
            hits,
            snapshot,
        }))
    }

    /// Second half of a turn: call the chat model and record the reply
    pub async fn complete_turn(
        &self,
        conversation: &mut Conversation,
        pending: PendingAnswer,
        tokens: Option<mpsc::Sender<String>>,
    ) -> Result<TurnOutcome, AgentError> {
        let completion = match tokens {
            Some(tx) => self.model.complete_stream(conversation.messages(), tx).await,
            None => self.model.complete(conversation.messages()).await,
        };

        let completion = match completion {
            Ok(completion) => completion,
            Err(e) => {
                *conversation = pending.snapshot;
                tracing::error!(error = %e, route = %pending.route, "Chat completion failed");
                return Err(AgentError::Llm(e.to_string()));
            }
        };

        // A partial reply is not recorded
        if matches!(
            completion.finish_reason,
            FinishReason::Cancelled | FinishReason::Error
        ) {
            *conversation = pending.snapshot;
            tracing::warn!(
                route = %pending.route,
                finish_reason = ?completion.finish_reason,
                "Chat completion did not finish"
            );
            return Err(AgentError::Llm(format!(
                "completion ended with {:?}",
                completion.finish_reason
            )));
        }

        let reply = completion.text.trim().to_string();
        conversation.push_assistant(reply.clone());

        tracing::info!(
            route = %pending.route,
            hits = pending.hits.len(),
            completion_tokens = completion.completion_tokens,
            "Turn answered"
        );

        Ok(TurnOutcome::Answered {
            route: pending.route,
            rewritten_query: pending.rewritten_query,
            hits: pending.hits,
            reply,
        })
    }

    /// Answer a single question from retrieved passages, no routing or history
    pub async fn ask(&self, query: &str) -> Result<AskOutcome, AgentError> {
        let hits = self.retriever.search(query, self.config.ask_limit).await?;
        let prompt = build_ask_prompt(query, &hits);

        let messages = [
            Message::system(self.config.system_prompt.clone()),
            Message::user(prompt.clone()),
        ];
        let completion = self
            .model
            .complete(&messages)
            .await
            .map_err(|e| AgentError::Llm(e.to_string()))?;

        Ok(AskOutcome {
            prompt,
            hits,
            reply: completion.text.trim().to_string(),
        })
    }
}
