//! API middleware and shared state
//!
//! Contains:
//! - Request statistics (atomics, no locks)
//! - Application state handed to every handler
//! - The JSON error envelope and conversions from service errors

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::db::DynDatabasePool;
use crate::notify::Notifier;
use crate::services::{
    ActivityServiceError, ConversationRateLimiter, ConversationServiceError,
    ParticipantServiceError, PlanServiceError, PreferenceServiceError, Services,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    /// Total number of requests processed
    total_requests: AtomicU64,
    /// Total response time in microseconds (for calculating average)
    total_response_time_us: AtomicU64,
    /// Application start time
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a request with its response time
    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub services: Services,
    pub notifier: Arc<Notifier>,
    pub limiter: Arc<ConversationRateLimiter>,
    pub request_stats: Arc<RequestStats>,
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMITED", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the underlying error and hide it from the client
    fn internal(context: &str, error: anyhow::Error) -> Self {
        tracing::error!("{}: {:#}", context, error);
        Self::internal_error(context)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<ActivityServiceError> for ApiError {
    fn from(e: ActivityServiceError) -> Self {
        match e {
            ActivityServiceError::NotFound(msg) => Self::not_found(msg),
            ActivityServiceError::ValidationError(msg) => Self::validation_error(msg),
            ActivityServiceError::Conflict(msg) => Self::conflict(msg),
            ActivityServiceError::InternalError(e) => {
                Self::internal("Activity operation failed", e)
            }
        }
    }
}

impl From<ParticipantServiceError> for ApiError {
    fn from(e: ParticipantServiceError) -> Self {
        match e {
            ParticipantServiceError::NotFound(msg) => Self::not_found(msg),
            ParticipantServiceError::ValidationError(msg) => Self::validation_error(msg),
            ParticipantServiceError::InvalidTransition(msg) => {
                Self::conflict(format!("Invalid participant status change: {}", msg))
            }
            ParticipantServiceError::InternalError(e) => {
                Self::internal("Participant operation failed", e)
            }
        }
    }
}

impl From<PreferenceServiceError> for ApiError {
    fn from(e: PreferenceServiceError) -> Self {
        match e {
            PreferenceServiceError::ValidationError(msg) => Self::validation_error(msg),
            PreferenceServiceError::InternalError(e) => {
                Self::internal("Preference operation failed", e)
            }
        }
    }
}

impl From<PlanServiceError> for ApiError {
    fn from(e: PlanServiceError) -> Self {
        match e {
            PlanServiceError::NotFound(msg) => Self::not_found(msg),
            PlanServiceError::ValidationError(msg) => Self::validation_error(msg),
            PlanServiceError::NotReady(msg) => {
                Self::with_details("CONFLICT", msg, serde_json::json!({ "reason": "not_ready" }))
            }
            PlanServiceError::Conflict(msg) => Self::conflict(msg),
            PlanServiceError::InternalError(e) => Self::internal("Plan operation failed", e),
        }
    }
}

impl From<ConversationServiceError> for ApiError {
    fn from(e: ConversationServiceError) -> Self {
        match e {
            ConversationServiceError::NotFound(msg) => Self::not_found(msg),
            ConversationServiceError::ValidationError(msg) => Self::validation_error(msg),
            ConversationServiceError::Conflict(msg) => Self::conflict(msg),
            ConversationServiceError::InternalError(e) => {
                Self::internal("Conversation failed", e)
            }
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Request statistics middleware
///
/// Records request count and response time for the health endpoint.
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let response = next.run(request).await;

    // Microseconds for precision
    let duration_us = start.elapsed().as_micros() as u64;
    state.request_stats.record(duration_us);

    response
}

/// Reject a conversation call once `key` is over its window budget
pub async fn check_conversation_limit(state: &AppState, key: &str) -> Result<(), ApiError> {
    if state.limiter.try_acquire(key).await {
        return Ok(());
    }
    tracing::warn!("Conversation rate limit reached for {}", key);
    Err(ApiError::rate_limited(
        "Too many messages, please wait a few minutes and try again",
    ))
}

/// Client address for per-client limits.
/// Checks X-Forwarded-For, X-Real-IP, then the connection info.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return Some(ip.to_string());
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_sources() {
        let mut extensions = Extensions::new();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, &extensions), None);

        extensions.insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4321))));
        assert_eq!(client_ip(&headers, &extensions).as_deref(), Some("10.0.0.7"));

        headers.insert("x-real-ip", "192.0.2.4".parse().unwrap());
        assert_eq!(client_ip(&headers, &extensions).as_deref(), Some("192.0.2.4"));

        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, &extensions).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_request_stats_average() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(100);
        stats.record(300);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.avg_response_time_us(), 200.0);
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (ApiError::rate_limited("x"), StatusCode::TOO_MANY_REQUESTS),
            (ApiError::internal_error("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_not_ready_maps_to_conflict() {
        let error: ApiError = PlanServiceError::NotReady("No responses yet".to_string()).into();
        assert_eq!(error.error.code, "CONFLICT");
        assert_eq!(error.error.details.unwrap()["reason"], "not_ready");
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let error: ApiError =
            ActivityServiceError::InternalError(anyhow::anyhow!("disk on fire")).into();
        assert_eq!(error.error.code, "INTERNAL_ERROR");
        assert!(!error.error.message.contains("disk"));
    }
}
