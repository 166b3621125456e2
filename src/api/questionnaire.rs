//! Questionnaire API endpoints
//!
//! - GET  /api/v1/activities/{id}/participants/{pid}/questions - Next unanswered batch
//! - POST /api/v1/activities/{id}/participants/{pid}/answers - Submit a batch of answers

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::api::middleware::{ApiError, AppState};
use crate::models::ParticipantStatus;
use crate::services::{questionnaire, QuestionBatch, SubmitOutcome};

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub participant_id: String,
    pub status: ParticipantStatus,
    pub complete: bool,
    pub total_batches: usize,
    /// `None` once every batch is answered
    pub batch: Option<QuestionBatch>,
}

#[derive(Debug, Deserialize)]
pub struct AnswersRequest {
    pub answers: BTreeMap<String, Value>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/questions", get(get_questions))
        .route("/answers", post(submit_answers))
}

/// GET /api/v1/activities/{id}/participants/{pid}/questions
async fn get_questions(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
) -> Result<Json<QuestionsResponse>, ApiError> {
    let participant = state.services.participants.get_in_activity(&id, &pid).await?;
    let batch = state
        .services
        .questionnaire
        .next_for(&participant)
        .await?
        .cloned();

    Ok(Json(QuestionsResponse {
        participant_id: participant.id,
        status: participant.status,
        complete: batch.is_none(),
        total_batches: questionnaire::batches().len(),
        batch,
    }))
}

/// POST /api/v1/activities/{id}/participants/{pid}/answers
async fn submit_answers(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
    Json(body): Json<AnswersRequest>,
) -> Result<Json<SubmitOutcome>, ApiError> {
    let participant = state.services.participants.get_in_activity(&id, &pid).await?;
    Ok(Json(
        state
            .services
            .questionnaire
            .submit_answers(participant, body.answers)
            .await?,
    ))
}
