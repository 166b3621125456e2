//! Conversation API endpoints
//!
//! - POST /api/v1/activities/{id}/participants/{pid}/chat - Participant preference chat
//! - POST /api/v1/activities/{id}/converse - Organizer conversation with a quick plan
//! - POST /api/v1/assistant/activity-input - Organizer free-form detail extraction
//!
//! Every endpoint here is rate limited per conversation.

use axum::{
    extract::{Path, State},
    http::{Extensions, HeaderMap},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{check_conversation_limit, client_ip, ApiError, AppState};
use crate::models::ChatTurn;
use crate::services::{ChatOutcome, ConverseOutcome, CreatorInputOutcome};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Prior turns; the stored conversation is used when absent
    #[serde(default)]
    pub history: Option<Vec<ChatTurn>>,
}

#[derive(Debug, Deserialize)]
pub struct ConverseRequest {
    #[serde(alias = "input")]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivityInputRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub activity_id: Option<String>,
}

pub fn participant_router() -> Router<AppState> {
    Router::new().route("/chat", post(participant_chat))
}

/// POST /api/v1/activities/{id}/participants/{pid}/chat
async fn participant_chat(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatOutcome>, ApiError> {
    check_conversation_limit(&state, &format!("chat:{}", pid)).await?;
    let outcome = state
        .services
        .conversation
        .participant_chat(&id, &pid, &body.message, body.history)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/activities/{id}/converse
pub async fn organizer_converse(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ConverseRequest>,
) -> Result<Json<ConverseOutcome>, ApiError> {
    check_conversation_limit(&state, &format!("converse:{}", id)).await?;
    let outcome = state
        .services
        .conversation
        .organizer_converse(&id, &body.message)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/assistant/activity-input
///
/// Calls for an existing activity share that activity's budget; stateless
/// calls are limited per client address.
pub async fn activity_input(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(body): Json<ActivityInputRequest>,
) -> Result<Json<CreatorInputOutcome>, ApiError> {
    let key = match body.activity_id.as_deref() {
        Some(id) => {
            state.services.activities.get(id).await?;
            format!("activity-input:{}", id)
        }
        None => format!(
            "activity-input:client:{}",
            client_ip(&headers, &extensions).unwrap_or_else(|| "unknown".to_string())
        ),
    };
    check_conversation_limit(&state, &key).await?;
    let outcome = state
        .services
        .conversation
        .creator_input(&body.message, &body.history, body.activity_id.as_deref())
        .await?;
    Ok(Json(outcome))
}
