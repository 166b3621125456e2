//! LLM client module
//!
//! Chat completion against the Anthropic Messages API plus helpers for
//! pulling JSON out of model replies.

use std::sync::Arc;

use tracing::{info, warn};

mod anthropic;
pub mod client;
mod error;
pub mod parse;

pub use anthropic::AnthropicClient;
pub use client::{CompletionRequest, LlmClient};
pub use error::LlmError;

use crate::config::LlmConfig;

/// Create the configured LLM client, or `None` when no API key is set
pub fn create_client(config: &LlmConfig) -> Option<Arc<dyn LlmClient>> {
    if !config.is_configured() {
        info!("LLM API key missing, conversational replies use keyword matching");
        return None;
    }
    match AnthropicClient::from_config(config) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Failed to create LLM client: {}", e);
            None
        }
    }
}
