//! OpenAI-compatible chat backend
//!
//! Talks to `/chat/completions` on OpenAI or any server exposing the same
//! API (vLLM, Ollama's `/v1`, LiteLLM). Streaming responses are parsed from
//! Server-Sent Events and forwarded token by token.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use sales_rag_config::constants::{endpoints, models, timeouts};
use sales_rag_config::LlmSettings;
use sales_rag_core::{ChatModel, Completion, FinishReason, Message};

use crate::LlmError;

/// OpenAI backend configuration
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API base, without the `/chat/completions` suffix
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::OPENAI_API.to_string(),
            api_key: None,
            model: models::CHAT.to_string(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(timeouts::LLM_REQUEST_SECS),
            max_retries: timeouts::LLM_MAX_RETRIES,
            initial_backoff: Duration::from_millis(timeouts::LLM_INITIAL_BACKOFF_MS),
        }
    }
}

impl OpenAIConfig {
    /// Hosted OpenAI with the given key and model
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Self-hosted OpenAI-compatible server
    pub fn local(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            ..Default::default()
        }
    }
}

impl From<&LlmSettings> for OpenAIConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

/// Rough token estimate for logging, about four graphemes per token
pub fn estimate_tokens(text: &str) -> usize {
    use unicode_segmentation::UnicodeSegmentation;
    text.graphemes(true).count().div_ceil(4)
}

/// One parsed SSE line
#[derive(Debug, PartialEq)]
enum SseEvent {
    Token(String),
    Finish(FinishReason),
    Done,
    Skip,
}

/// Byte buffer that yields only complete lines
///
/// Network chunks can end inside a multi-byte character, so bytes are
/// decoded per line, never per chunk.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.bytes.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn remainder(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

fn parse_sse_line(line: &str) -> SseEvent {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let Some(choice) = chunk.choices.into_iter().next() else {
                return SseEvent::Skip;
            };
            match choice.delta.and_then(|d| d.content) {
                Some(content) if !content.is_empty() => SseEvent::Token(content),
                _ => match choice.finish_reason {
                    Some(reason) => SseEvent::Finish(parse_finish_reason(Some(&reason))),
                    None => SseEvent::Skip,
                },
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparseable stream chunk");
            SseEvent::Skip
        }
    }
}

/// OpenAI-compatible chat backend
pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        let has_key = config.api_key.as_deref().is_some_and(|k| !k.is_empty());
        if !has_key && config.endpoint.starts_with(endpoints::OPENAI_API) {
            return Err(LlmError::Configuration(
                "API key required for the hosted OpenAI endpoint".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Full API URL for chat completions
    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, messages: &'a [Message], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream,
        }
    }

    /// Send once, mapping 5xx to a retryable error
    async fn execute_request(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let mut builder = self.client.post(self.chat_url()).json(request);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(LlmError::Network(format!("Server error {}: {}", status, error_text)));
        }
        Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)))
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }

    /// Send with exponential backoff on transient failures
    async fn send_with_retry(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    "LLM request failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    self.config.max_retries
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) if Self::is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }

    async fn generate(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        let start = Instant::now();
        let request = self.build_request(messages, false);

        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            approx_prompt_tokens = messages.iter().map(|m| estimate_tokens(&m.content)).sum::<usize>(),
            "Chat completion request"
        );

        let response: ChatResponse = self
            .send_with_retry(&request)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let (prompt_tokens, completion_tokens) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Completion {
            text: choice.message.content.unwrap_or_default().trim().to_string(),
            finish_reason: parse_finish_reason(choice.finish_reason.as_deref()),
            prompt_tokens,
            completion_tokens,
            total_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<Completion, LlmError> {
        let start = Instant::now();
        let request = self.build_request(messages, true);
        let response = self.send_with_retry(&request).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = LineBuffer::default();
        let mut full_text = String::new();
        let mut token_count = 0u32;
        let mut finish_reason = FinishReason::Stop;

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.extend(&chunk);

            while let Some(line) = buffer.next_line() {
                match parse_sse_line(&line) {
                    SseEvent::Token(token) => {
                        full_text.push_str(&token);
                        token_count += 1;
                        if tx.send(token).await.is_err() {
                            tracing::debug!("Token receiver dropped, cancelling stream");
                            finish_reason = FinishReason::Cancelled;
                            break 'outer;
                        }
                    }
                    SseEvent::Finish(reason) => finish_reason = reason,
                    SseEvent::Done => break 'outer,
                    SseEvent::Skip => {}
                }
            }
        }

        // Trailing line without a newline
        if finish_reason != FinishReason::Cancelled {
            if let SseEvent::Token(token) = parse_sse_line(&buffer.remainder()) {
                full_text.push_str(&token);
                token_count += 1;
                let _ = tx.send(token).await;
            }
        }

        Ok(Completion {
            text: full_text,
            finish_reason,
            prompt_tokens: 0,
            completion_tokens: token_count,
            total_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIBackend {
    async fn complete(&self, messages: &[Message]) -> sales_rag_core::Result<Completion> {
        Ok(self.generate(messages).await?)
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> sales_rag_core::Result<Completion> {
        Ok(self.generate_stream(messages, tx).await?)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> OpenAIConfig {
        OpenAIConfig {
            endpoint: server.uri(),
            api_key: Some("sk-test".to_string()),
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = OpenAIConfig::default();
        assert_eq!(config.endpoint, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_backend_creation() {
        // Local endpoint works without API key
        let config = OpenAIConfig::local("http://localhost:8000/v1", "llama-3");
        assert!(OpenAIBackend::new(config).is_ok());

        // Hosted endpoint requires API key
        assert!(OpenAIBackend::new(OpenAIConfig::default()).is_err());

        let config = OpenAIConfig::openai("sk-xxx", "gpt-4o-mini");
        assert!(OpenAIBackend::new(config).is_ok());
    }

    #[test]
    fn test_chat_url() {
        let config = OpenAIConfig::local("http://localhost:8000/v1/", "m");
        let backend = OpenAIBackend::new(config).unwrap();
        assert_eq!(backend.chat_url(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_request_serialization() {
        let backend = OpenAIBackend::new(OpenAIConfig::local("http://localhost", "m")).unwrap();
        let messages = vec![Message::system("sys"), Message::user("Xin chào")];
        let request = backend.build_request(&messages, true);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Xin chào");
        assert_eq!(json["stream"], true);
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_parse_sse_line() {
        let token = r#"data: {"choices":[{"delta":{"content":"Chào"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(token), SseEvent::Token("Chào".to_string()));

        let empty = r#"data: {"choices":[{"delta":{"content":""},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(empty), SseEvent::Skip);

        let finish = r#"data: {"choices":[{"delta":{},"finish_reason":"length"}]}"#;
        assert_eq!(parse_sse_line(finish), SseEvent::Finish(FinishReason::Length));

        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(parse_sse_line(""), SseEvent::Skip);
    }

    #[test]
    fn test_line_buffer_keeps_split_characters() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"Điện thoại\"},\"finish_reason\":null}]}\n";
        let bytes = line.as_bytes();
        // "Đ" is two bytes; cut between them
        let split = line.find('Đ').unwrap() + 1;

        let mut buffer = LineBuffer::default();
        buffer.extend(&bytes[..split]);
        assert!(buffer.next_line().is_none());
        buffer.extend(&bytes[split..]);

        let decoded = buffer.next_line().unwrap();
        assert_eq!(
            parse_sse_line(&decoded),
            SseEvent::Token("Điện thoại".to_string())
        );
        assert!(buffer.next_line().is_none());
        assert!(buffer.remainder().is_empty());
    }

    #[tokio::test]
    async fn test_complete_trims_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "  Dạ em chào anh/chị 😊 \n"}, "finish_reason": "stop"},
                    {"message": {"role": "assistant", "content": "ignored"}, "finish_reason": "stop"}
                ],
                "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server)).unwrap();
        let completion = backend.complete(&[Message::user("Xin chào")]).await.unwrap();

        assert_eq!(completion.text, "Dạ em chào anh/chị 😊");
        assert_eq!(completion.prompt_tokens, 12);
        assert_eq!(completion.completion_tokens, 7);
        assert_eq!(completion.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_stream_forwards_tokens() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"iPhone \"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"15\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"},\"finish_reason\":null}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server)).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let completion = backend
            .complete_stream(&[Message::user("giá iphone")], tx)
            .await
            .unwrap();

        let mut tokens = Vec::new();
        while let Some(token) = rx.recv().await {
            tokens.push(token);
        }
        assert_eq!(tokens, vec!["iPhone ", "15"]);
        assert_eq!(completion.text, "iPhone 15");
        assert_eq!(completion.completion_tokens, 2);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server)).unwrap();
        let completion = backend.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(completion.text, "ok");
    }

    #[tokio::test]
    async fn test_client_errors_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server)).unwrap();
        let err = backend.generate(&[Message::user("hi")]).await.unwrap_err();
        match err {
            LlmError::Api(msg) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("invalid api key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::new(test_config(&server)).unwrap();
        let err = backend.generate(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Network(_)));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
