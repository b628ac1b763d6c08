//! Conversation messages and history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator placed in front of each retrieved context block
pub const CONTEXT_HEADER: &str = "\nDữ liệu sản phẩm liên quan:\n";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// True for user and assistant messages
    pub fn is_dialogue(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
    }
}

/// Ordered conversation with the system message pinned at index 0
///
/// The system message starts as the base prompt. Product turns add retrieved
/// context to it, either by appending (so it keeps growing) or by replacing
/// whatever context was there before.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    base_prompt: String,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let base_prompt = system_prompt.into();
        Self {
            messages: vec![Message::system(base_prompt.clone())],
            base_prompt,
        }
    }

    /// All messages including the system message
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current system message content
    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    /// The prompt the conversation was created with
    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Append a context block to the system message
    pub fn append_context(&mut self, context: &str) {
        let system = &mut self.messages[0].content;
        system.push_str(CONTEXT_HEADER);
        system.push_str(context);
    }

    /// Rebuild the system message as base prompt plus this context only
    pub fn replace_context(&mut self, context: &str) {
        self.messages[0].content = format!("{}{}{}", self.base_prompt, CONTEXT_HEADER, context);
    }

    /// Last `limit` user/assistant messages, oldest first
    pub fn history(&self, limit: usize) -> Vec<&Message> {
        let dialogue: Vec<&Message> = self.messages.iter().filter(|m| m.is_dialogue()).collect();
        let start = dialogue.len().saturating_sub(limit);
        dialogue[start..].to_vec()
    }

    /// Every message after the system message
    pub fn dialogue(&self) -> &[Message] {
        &self.messages[1..]
    }

    /// Number of messages including the system message
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when only the system message is present
    pub fn is_empty(&self) -> bool {
        self.messages.len() == 1
    }
}
