//! LLM error types

use thiserror::Error;

/// Errors from a completion call
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM client is not configured")]
    NotConfigured,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether the provider rejected the request because of its rate limit
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::Api { status: 429, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_rate_limit() {
        let err = LlmError::Api {
            status: 429,
            body: "slow down".to_string(),
        };
        assert!(err.is_rate_limit());
        assert!(!LlmError::EmptyResponse.is_rate_limit());
    }

    #[test]
    fn test_display() {
        let err = LlmError::Api {
            status: 401,
            body: "invalid x-api-key".to_string(),
        };
        assert_eq!(err.to_string(), "API error 401: invalid x-api-key");
    }
}
