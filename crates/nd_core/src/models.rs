use std::fmt;

use async_trait::async_trait;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single call to the generative-text service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub messages: Vec<PromptMessage>,
    pub max_tokens: u32,
    /// Maximum web searches the model may run; `None` disables the search tool.
    pub web_search: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![PromptMessage::user(prompt)],
            max_tokens: 4096,
            web_search: None,
        }
    }

    pub fn with_messages(messages: Vec<PromptMessage>) -> Self {
        Self {
            messages,
            max_tokens: 4096,
            web_search: None,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn web_search(mut self, max_uses: u32) -> Self {
        self.web_search = Some(max_uses);
        self
    }

    /// Text of the final user message, used for logging and by scripted models.
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == PromptRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Run the request and return the text segments of the reply, in order.
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>>;
}
