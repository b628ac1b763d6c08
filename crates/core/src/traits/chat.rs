//! Chat completion trait

use crate::{Message, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Cancelled,
}

/// A finished chat completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub finish_reason: FinishReason,
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_time_ms: u64,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: FinishReason::Stop,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_time_ms: 0,
        }
    }
}

/// Chat model interface
///
/// # Example
///
/// ```ignore
/// let model: Arc<dyn ChatModel> = Arc::new(OpenAIBackend::new(config)?);
/// let reply = model.complete(conversation.messages()).await?;
/// println!("{}", reply.text);
/// ```
#[async_trait]
pub trait ChatModel: Send + Sync + 'static {
    /// Generate a full reply
    async fn complete(&self, messages: &[Message]) -> Result<Completion>;

    /// Generate a reply, forwarding each token to `tx` as it arrives
    ///
    /// The returned completion carries the whole text. A dropped receiver
    /// cancels the stream.
    async fn complete_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<Completion>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
