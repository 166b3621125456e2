//! LlmClient trait definition

use async_trait::async_trait;
use serde::Serialize;

use super::LlmError;
use crate::models::ChatTurn;

/// One stateless completion request
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    /// Conversation so far, starting with a user turn
    pub messages: Vec<ChatTurn>,
    /// Overrides the configured limit when set
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, messages: Vec<ChatTurn>) -> Self {
        Self {
            system: system.into(),
            messages,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Chat-style LLM completion. Each call is independent; conversation
/// history travels in the request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Return the assistant's response text
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}
