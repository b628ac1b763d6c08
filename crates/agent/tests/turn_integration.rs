//! End-to-end turn handling with an in-memory store, hashed embeddings and a
//! scripted chat model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use sales_rag_agent::{AgentConfig, SalesAgent, TurnOutcome};
use sales_rag_config::prompts::{CLARIFY_MESSAGE, REWRITE_SYSTEM_PROMPT, SYSTEM_PROMPT};
use sales_rag_config::{Aggregation, ContextMode};
use sales_rag_core::{
    ChatModel, Completion, Conversation, Embedder, Error, FinishReason, Message, Product, Role,
};
use sales_rag_llm::HashEmbedder;
use sales_rag_rag::{
    IngestMode, Ingestor, MemoryStore, ProductRetriever, Route, RetrieverConfig, SemanticRouter,
};

const ANSWER: &str = "Dạ, em gửi anh/chị thông tin sản phẩm ạ 😊";

/// Answers rewrite prompts by echoing the latest customer line, everything
/// else with a fixed reply
struct ScriptedModel {
    rewrite_to: Option<String>,
    fail_answers: AtomicBool,
    cancel_answers: AtomicBool,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    fn new() -> Self {
        Self {
            rewrite_to: None,
            fail_answers: AtomicBool::new(false),
            cancel_answers: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn rewriting_to(text: &str) -> Self {
        Self {
            rewrite_to: Some(text.to_string()),
            ..Self::new()
        }
    }

    fn answer_calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .iter()
            .filter(|m| m[0].content != REWRITE_SYSTEM_PROMPT)
            .cloned()
            .collect()
    }

    fn reply_for(&self, messages: &[Message]) -> sales_rag_core::Result<String> {
        self.calls.lock().push(messages.to_vec());

        if messages[0].content == REWRITE_SYSTEM_PROMPT {
            if let Some(ref text) = self.rewrite_to {
                return Ok(text.clone());
            }
            let last = messages[1]
                .content
                .lines()
                .last()
                .unwrap_or_default()
                .trim_start_matches("Khách: ")
                .to_string();
            return Ok(last);
        }

        if self.fail_answers.load(Ordering::SeqCst) {
            return Err(Error::Llm("HTTP 500: upstream down".to_string()));
        }
        Ok(ANSWER.to_string())
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[Message]) -> sales_rag_core::Result<Completion> {
        Ok(Completion::new(self.reply_for(messages)?))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> sales_rag_core::Result<Completion> {
        let reply = self.reply_for(messages)?;
        let is_answer = messages[0].content != REWRITE_SYSTEM_PROMPT;
        if is_answer && self.cancel_answers.load(Ordering::SeqCst) {
            // Receiver went away after the first token
            let first = reply.split_inclusive(' ').next().unwrap_or_default().to_string();
            let _ = tx.send(first.clone()).await;
            return Ok(Completion {
                finish_reason: FinishReason::Cancelled,
                ..Completion::new(first)
            });
        }
        for word in reply.split_inclusive(' ') {
            let _ = tx.send(word.to_string()).await;
        }
        Ok(Completion::new(reply))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn catalog() -> Vec<Product> {
    vec![
        Product {
            title: "iPhone 15 128GB".to_string(),
            product_specs: "Chip A16 Bionic, camera 48MP".to_string(),
            current_price: "19.990.000 ₫".to_string(),
            product_promotion: "Giảm 500.000đ".to_string(),
            color_options: "Đen, Hồng, Xanh".to_string(),
        },
        Product {
            title: "Samsung Galaxy A15".to_string(),
            product_specs: "Pin 5000mAh, màn hình 6.5 inch".to_string(),
            current_price: "4.490.000 ₫".to_string(),
            product_promotion: String::new(),
            color_options: "Xanh".to_string(),
        },
        Product {
            title: "Nokia 105".to_string(),
            product_specs: "Pin trâu, nghe gọi".to_string(),
            current_price: "590.000 ₫".to_string(),
            product_promotion: String::new(),
            color_options: "Đen".to_string(),
        },
    ]
}

fn routes() -> Vec<Route> {
    vec![
        Route::new(
            "products",
            vec![
                "iPhone 15 giá bao nhiêu".to_string(),
                "Samsung Galaxy A15 pin bao nhiêu".to_string(),
            ],
        ),
        Route::new(
            "chitchat",
            vec!["xin chào shop".to_string(), "cảm ơn em nhé".to_string()],
        ),
    ]
}

async fn agent_with(model: Arc<ScriptedModel>, config: AgentConfig) -> SalesAgent {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let store = Arc::new(MemoryStore::new());

    Ingestor::new(store.clone(), embedder.clone())
        .run(&catalog(), IngestMode::IfEmpty)
        .await
        .unwrap();

    let router = SemanticRouter::new(embedder.clone(), routes(), 0.4, Aggregation::Max)
        .await
        .unwrap();
    let retriever = ProductRetriever::new(
        store,
        embedder,
        None,
        RetrieverConfig {
            top_k: 2,
            rerank_candidates: 3,
        },
    );

    SalesAgent::new(model, router, retriever, config)
}

fn config(rewrite: bool, mode: ContextMode) -> AgentConfig {
    AgentConfig {
        rewrite_enabled: rewrite,
        context_mode: mode,
        ..AgentConfig::default()
    }
}

#[tokio::test]
async fn test_product_turn_injects_context() {
    let model = Arc::new(ScriptedModel::new());
    let agent = agent_with(model.clone(), config(false, ContextMode::Accumulate)).await;
    let mut conversation = agent.new_conversation();

    let outcome = agent
        .handle(&mut conversation, "iPhone 15 giá bao nhiêu", None)
        .await
        .unwrap();

    let TurnOutcome::Answered { route, hits, reply, .. } = &outcome else {
        panic!("expected an answer, got {outcome:?}");
    };
    assert_eq!(route, "products");
    assert_eq!(reply, ANSWER);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].title, "iPhone 15 128GB");

    let system = conversation.system_prompt();
    assert!(system.starts_with(SYSTEM_PROMPT));
    assert!(system.contains("\nDữ liệu sản phẩm liên quan:\nTên sản phẩm: iPhone 15 128GB\n"));

    let messages = conversation.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "iPhone 15 giá bao nhiêu");
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].content, ANSWER);

    // The model saw the whole conversation, context included
    let calls = model.answer_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0].content, system);
}

#[tokio::test]
async fn test_accumulate_mode_keeps_growing() {
    let model = Arc::new(ScriptedModel::new());
    let agent = agent_with(model, config(false, ContextMode::Accumulate)).await;
    let mut conversation = agent.new_conversation();

    agent
        .handle(&mut conversation, "iPhone 15 giá bao nhiêu", None)
        .await
        .unwrap();
    let after_first = conversation.system_prompt().to_string();

    agent
        .handle(&mut conversation, "Samsung Galaxy A15 pin bao nhiêu", None)
        .await
        .unwrap();

    let system = conversation.system_prompt();
    assert!(system.starts_with(&after_first));
    assert_eq!(system.matches("Dữ liệu sản phẩm liên quan:").count(), 2);
    assert_eq!(conversation.len(), 5);
}

#[tokio::test]
async fn test_replace_mode_keeps_latest_context_only() {
    let model = Arc::new(ScriptedModel::new());
    let agent = agent_with(model, config(false, ContextMode::Replace)).await;
    let mut conversation = agent.new_conversation();

    agent
        .handle(&mut conversation, "iPhone 15 giá bao nhiêu", None)
        .await
        .unwrap();
    agent
        .handle(&mut conversation, "Samsung Galaxy A15 pin bao nhiêu", None)
        .await
        .unwrap();

    let system = conversation.system_prompt();
    assert!(system.starts_with(SYSTEM_PROMPT));
    assert_eq!(system.matches("Dữ liệu sản phẩm liên quan:").count(), 1);
    assert!(system.contains("Samsung Galaxy A15"));
}

#[tokio::test]
async fn test_chitchat_turn_uses_original_query() {
    let model = Arc::new(ScriptedModel::rewriting_to("cảm ơn em nhé"));
    let agent = agent_with(model, config(true, ContextMode::Accumulate)).await;
    let mut conversation = agent.new_conversation();

    let outcome = agent
        .handle(&mut conversation, "ok cảm ơn em nha", None)
        .await
        .unwrap();

    assert_eq!(outcome.route(), "chitchat");
    assert!(outcome.hits().is_empty());
    assert_eq!(conversation.system_prompt(), SYSTEM_PROMPT);
    assert_eq!(conversation.messages()[1].content, "ok cảm ơn em nha");
}

#[tokio::test]
async fn test_product_turn_uses_rewritten_query() {
    let model = Arc::new(ScriptedModel::rewriting_to("iPhone 15 giá bao nhiêu"));
    let agent = agent_with(model.clone(), config(true, ContextMode::Accumulate)).await;
    let mut conversation = agent.new_conversation();

    let outcome = agent
        .handle(&mut conversation, "máy đó giá sao em?", None)
        .await
        .unwrap();

    let TurnOutcome::Answered { rewritten_query, route, .. } = &outcome else {
        panic!("expected an answer, got {outcome:?}");
    };
    assert_eq!(route, "products");
    assert_eq!(rewritten_query, "iPhone 15 giá bao nhiêu");
    assert_eq!(conversation.messages()[1].content, "iPhone 15 giá bao nhiêu");

    // One rewrite call plus one answer call
    assert_eq!(model.calls.lock().len(), 2);
}

#[tokio::test]
async fn test_uncertain_turn_leaves_conversation_untouched() {
    let model = Arc::new(ScriptedModel::new());
    let agent = agent_with(model.clone(), config(false, ContextMode::Accumulate)).await;
    let mut conversation = agent.new_conversation();
    let before = conversation.messages().to_vec();

    let outcome = agent
        .handle(&mut conversation, "qwxz vbnm plkj", None)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TurnOutcome::Clarify {
            message: CLARIFY_MESSAGE.to_string()
        }
    );
    assert_eq!(conversation.messages(), before.as_slice());
    assert!(model.answer_calls().is_empty());
}

#[tokio::test]
async fn test_streaming_forwards_tokens() {
    let model = Arc::new(ScriptedModel::new());
    let agent = agent_with(model, config(false, ContextMode::Accumulate)).await;
    let mut conversation = agent.new_conversation();

    let (tx, mut rx) = mpsc::channel(64);
    let outcome = agent
        .handle(&mut conversation, "xin chào shop", Some(tx))
        .await
        .unwrap();

    let mut streamed = String::new();
    while let Some(token) = rx.recv().await {
        streamed.push_str(&token);
    }
    assert_eq!(streamed, ANSWER);
    assert_eq!(outcome.reply(), ANSWER);
    assert_eq!(outcome.route(), "chitchat");
}

#[tokio::test]
async fn test_failed_completion_restores_conversation() {
    let model = Arc::new(ScriptedModel::new());
    let agent = agent_with(model.clone(), config(false, ContextMode::Accumulate)).await;
    let mut conversation = agent.new_conversation();

    agent
        .handle(&mut conversation, "xin chào shop", None)
        .await
        .unwrap();
    let before = conversation.clone();

    model.fail_answers.store(true, Ordering::SeqCst);
    let result = agent
        .handle(&mut conversation, "iPhone 15 giá bao nhiêu", None)
        .await;

    assert!(result.is_err());
    assert_eq!(conversation.messages(), before.messages());
}

#[tokio::test]
async fn test_cancelled_completion_is_not_recorded() {
    let model = Arc::new(ScriptedModel::new());
    let agent = agent_with(model.clone(), config(false, ContextMode::Accumulate)).await;
    let mut conversation = agent.new_conversation();

    agent
        .handle(&mut conversation, "xin chào shop", None)
        .await
        .unwrap();
    let before = conversation.clone();

    model.cancel_answers.store(true, Ordering::SeqCst);
    let (tx, mut rx) = mpsc::channel(64);
    let result = agent
        .handle(&mut conversation, "iPhone 15 giá bao nhiêu", Some(tx))
        .await;

    assert!(result.is_err());
    assert_eq!(rx.recv().await.as_deref(), Some("Dạ, "));
    assert_eq!(conversation.messages(), before.messages());
    assert_eq!(conversation.system_prompt(), before.system_prompt());
}

#[tokio::test]
async fn test_ask_one_shot() {
    let model = Arc::new(ScriptedModel::new());
    let agent = agent_with(model.clone(), config(false, ContextMode::Accumulate)).await;

    let outcome = agent.ask("Nokia 105 pin trâu").await.unwrap();
    assert_eq!(outcome.reply, ANSWER);
    assert_eq!(outcome.hits.len(), 3);
    assert!(outcome
        .prompt
        .starts_with("Trả lời câu hỏi dựa trên thông tin sau:\nNokia 105 pin trâu\n\n"));
    assert!(outcome.prompt.ends_with("Trả lời: "));

    let calls = model.answer_calls();
    assert_eq!(calls[0].len(), 2);
    assert_eq!(calls[0][0].content, SYSTEM_PROMPT);
    assert_eq!(calls[0][1].content, outcome.prompt);
}

#[test]
fn test_conversation_starts_with_system_prompt() {
    let conversation = Conversation::new(SYSTEM_PROMPT);
    assert!(conversation.is_empty());
    assert_eq!(conversation.messages()[0].role, Role::System);
}
