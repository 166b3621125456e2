//! Participant API endpoints
//!
//! - POST /api/v1/activities/{id}/participants - Add participants and invite them
//! - GET  /api/v1/activities/{id}/participants - List participants
//! - PUT  /api/v1/activities/{id}/participants/{pid} - Update contact fields
//! - POST /api/v1/activities/{id}/participants/{pid}/invitation - Resend one invitation
//! - POST /api/v1/activities/{id}/participants/{pid}/reset - Reset questionnaire progress
//! - GET  /api/v1/activities/{id}/participants/{pid}/preferences - Stored preferences
//! - POST /api/v1/activities/{id}/participants/{pid}/preferences - Save preferences
//! - POST /api/v1/activities/{id}/invitations - Resend to everyone still invited

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{CategoryMap, NewParticipantInput, Participant, UpdateParticipantInput};
use crate::notify::{DeliveryReport, NotifyChannels};

#[derive(Debug, Deserialize)]
pub struct AddParticipantsRequest {
    pub participants: Vec<NewParticipantInput>,
    #[serde(default)]
    pub skip_sms: bool,
    #[serde(default)]
    pub skip_email: bool,
}

/// Outcome of adding one entry of a bulk request
#[derive(Debug, Serialize)]
pub struct AddParticipantResult {
    pub phone_number: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddParticipantsResponse {
    pub results: Vec<AddParticipantResult>,
    pub added: usize,
    pub invitations: DeliveryReport,
}

#[derive(Debug, Serialize)]
pub struct ParticipantListResponse {
    pub participants: Vec<Participant>,
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub invited: usize,
    pub delivery: DeliveryReport,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default = "default_resend")]
    pub resend: bool,
}

fn default_resend() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub participant: Participant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryReport>,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub participant_id: String,
    pub preferences: CategoryMap,
}

#[derive(Debug, Serialize)]
pub struct SavePreferencesResponse {
    pub participant_id: String,
    pub saved: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_participants).post(add_participants))
        .route("/{pid}", put(update_participant))
        .route("/{pid}/invitation", post(resend_invitation))
        .route("/{pid}/reset", post(reset_progress))
        .route(
            "/{pid}/preferences",
            get(get_preferences).post(save_preferences),
        )
}

/// POST /api/v1/activities/{id}/participants
async fn add_participants(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AddParticipantsRequest>,
) -> Result<Json<AddParticipantsResponse>, ApiError> {
    if body.participants.is_empty() {
        return Err(ApiError::validation_error("No participants provided"));
    }
    state.services.activities.get(&id).await?;

    let mut results = Vec::with_capacity(body.participants.len());
    let mut added = Vec::new();
    for entry in body.participants {
        let outcome = state
            .services
            .participants
            .add(&id, &entry.phone_number, entry.email, entry.name)
            .await;
        match outcome {
            Ok(participant) => {
                added.push(participant.clone());
                results.push(AddParticipantResult {
                    phone_number: entry.phone_number,
                    success: true,
                    participant: Some(participant),
                    error: None,
                });
            }
            Err(e) => {
                tracing::warn!("Failed to add participant {}: {}", entry.phone_number, e);
                results.push(AddParticipantResult {
                    phone_number: entry.phone_number,
                    success: false,
                    participant: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let channels = NotifyChannels {
        sms: !body.skip_sms,
        email: !body.skip_email,
    };
    let invitations = state.notifier.invite_all(&added, None, channels).await;

    Ok(Json(AddParticipantsResponse {
        results,
        added: added.len(),
        invitations,
    }))
}

/// GET /api/v1/activities/{id}/participants
async fn list_participants(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ParticipantListResponse>, ApiError> {
    state.services.activities.get(&id).await?;
    let participants = state.services.participants.list(&id).await?;
    Ok(Json(ParticipantListResponse { participants }))
}

/// PUT /api/v1/activities/{id}/participants/{pid}
async fn update_participant(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
    Json(input): Json<UpdateParticipantInput>,
) -> Result<Json<Participant>, ApiError> {
    Ok(Json(
        state.services.participants.update(&id, &pid, input).await?,
    ))
}

/// POST /api/v1/activities/{id}/participants/{pid}/invitation
async fn resend_invitation(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
) -> Result<Json<InvitationResponse>, ApiError> {
    let participant = state.services.participants.get_in_activity(&id, &pid).await?;
    let delivery = state
        .notifier
        .invite(&participant, None, NotifyChannels::default())
        .await;
    Ok(Json(InvitationResponse {
        invited: 1,
        delivery,
    }))
}

/// POST /api/v1/activities/{id}/invitations
pub async fn resend_pending_invitations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InvitationResponse>, ApiError> {
    state.services.activities.get(&id).await?;
    let pending = state.services.participants.list_invited(&id).await?;
    if pending.is_empty() {
        tracing::info!("No pending invitations to resend for activity {}", id);
    }
    let delivery = state
        .notifier
        .invite_all(&pending, None, NotifyChannels::default())
        .await;
    Ok(Json(InvitationResponse {
        invited: pending.len(),
        delivery,
    }))
}

/// POST /api/v1/activities/{id}/participants/{pid}/reset
async fn reset_progress(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
    body: Option<Json<ResetRequest>>,
) -> Result<Json<ResetResponse>, ApiError> {
    let resend = body.map(|Json(b)| b.resend).unwrap_or_else(default_resend);
    let participant = state.services.participants.reset_progress(&id, &pid).await?;

    let delivery = if resend {
        Some(
            state
                .notifier
                .invite(&participant, None, NotifyChannels::default())
                .await,
        )
    } else {
        None
    };

    Ok(Json(ResetResponse {
        participant,
        delivery,
    }))
}

/// GET /api/v1/activities/{id}/participants/{pid}/preferences
async fn get_preferences(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let participant = state.services.participants.get_in_activity(&id, &pid).await?;
    let preferences = state
        .services
        .preferences
        .for_participant(&participant.id)
        .await?;
    Ok(Json(PreferencesResponse {
        participant_id: participant.id,
        preferences,
    }))
}

/// POST /api/v1/activities/{id}/participants/{pid}/preferences
async fn save_preferences(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
    Json(preferences): Json<CategoryMap>,
) -> Result<(StatusCode, Json<SavePreferencesResponse>), ApiError> {
    let participant = state.services.participants.get_in_activity(&id, &pid).await?;
    let saved = state
        .services
        .preferences
        .save_map(&id, Some(&participant.id), &preferences)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SavePreferencesResponse {
            participant_id: participant.id,
            saved,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::api::test_support::{test_app, TestApp};
    use crate::notify::mock::RecordingSms;

    async fn create_activity(app: &TestApp) -> String {
        let created: Value = app
            .server
            .post("/api/v1/activities")
            .json(&json!({"title": "Board games", "skip_invitations": true}))
            .await
            .json();
        created["activity"]["id"].as_str().unwrap().to_string()
    }

    async fn add_one(app: &TestApp, id: &str, phone: &str, email: Option<&str>) -> String {
        let body: Value = app
            .server
            .post(&format!("/api/v1/activities/{}/participants", id))
            .json(&json!({
                "participants": [{"phone_number": phone, "email": email}],
                "skip_sms": true,
                "skip_email": true
            }))
            .await
            .json();
        body["results"][0]["participant"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_bulk_add_reports_each_entry() {
        let app = test_app()
            .sms(RecordingSms::failing_for(&["+15553334444"]))
            .build()
            .await;
        let id = create_activity(&app).await;

        let response = app
            .server
            .post(&format!("/api/v1/activities/{}/participants", id))
            .json(&json!({
                "participants": [
                    {"phone_number": "555-111-2222", "email": "kit@example.com"},
                    {"phone_number": "not a phone"},
                    {"phone_number": "555-333-4444"}
                ]
            }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();

        assert_eq!(body["added"], 2);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results[0]["success"], true);
        assert_eq!(results[1]["success"], false);
        assert!(results[1]["error"].as_str().unwrap().contains("Invalid phone number"));
        assert_eq!(results[2]["success"], true);

        // kit: sms + email, second: sms fails, no email
        assert_eq!(body["invitations"]["sent"], 2);
        assert_eq!(body["invitations"]["failed"], 1);
        assert_eq!(body["invitations"]["skipped"], 1);
    }

    #[tokio::test]
    async fn test_bulk_add_skip_channels() {
        let app = test_app().build().await;
        let id = create_activity(&app).await;

        let body: Value = app
            .server
            .post(&format!("/api/v1/activities/{}/participants", id))
            .json(&json!({
                "participants": [{"phone_number": "5551112222", "email": "kit@example.com"}],
                "skip_sms": true
            }))
            .await
            .json();
        assert_eq!(body["invitations"]["sent"], 1);
        assert!(app.sms.sent().is_empty());
        assert_eq!(app.email.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_add_validation() {
        let app = test_app().build().await;
        let id = create_activity(&app).await;

        app.server
            .post(&format!("/api/v1/activities/{}/participants", id))
            .json(&json!({"participants": []}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        app.server
            .post("/api/v1/activities/missing/participants")
            .json(&json!({"participants": [{"phone_number": "5551112222"}]}))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_participant() {
        let app = test_app().build().await;
        let id = create_activity(&app).await;
        let pid = add_one(&app, &id, "5551112222", None).await;

        let updated: Value = app
            .server
            .put(&format!("/api/v1/activities/{}/participants/{}", id, pid))
            .json(&json!({"name": "Kit", "allow_group_text": false}))
            .await
            .json();
        assert_eq!(updated["name"], "Kit");
        assert_eq!(updated["allow_group_text"], false);

        let list: Value = app
            .server
            .get(&format!("/api/v1/activities/{}/participants", id))
            .await
            .json();
        assert_eq!(list["participants"][0]["name"], "Kit");
    }

    #[tokio::test]
    async fn test_participant_from_other_activity_is_not_found() {
        let app = test_app().build().await;
        let first = create_activity(&app).await;
        let second = create_activity(&app).await;
        let pid = add_one(&app, &first, "5551112222", None).await;

        app.server
            .post(&format!("/api/v1/activities/{}/participants/{}/invitation", second, pid))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_resend_invitations() {
        let app = test_app().build().await;
        let id = create_activity(&app).await;
        let pid = add_one(&app, &id, "5551112222", Some("kit@example.com")).await;
        add_one(&app, &id, "5553334444", None).await;

        let one: Value = app
            .server
            .post(&format!("/api/v1/activities/{}/participants/{}/invitation", id, pid))
            .await
            .json();
        assert_eq!(one["delivery"]["sent"], 2);

        let all: Value = app
            .server
            .post(&format!("/api/v1/activities/{}/invitations", id))
            .await
            .json();
        assert_eq!(all["invited"], 2);
        assert_eq!(app.sms.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_preferences_and_reset() {
        let app = test_app().build().await;
        let id = create_activity(&app).await;
        let pid = add_one(&app, &id, "5551112222", None).await;
        let path = format!("/api/v1/activities/{}/participants/{}", id, pid);

        let saved = app
            .server
            .post(&format!("{}/preferences", path))
            .json(&json!({
                "activity": {"activity_type": "outdoor", "notes": ""},
                "timing": {"preferred_day": "Weekend"}
            }))
            .await;
        saved.assert_status(StatusCode::CREATED);
        let saved: Value = saved.json();
        assert_eq!(saved["saved"], 2);

        let prefs: Value = app.server.get(&format!("{}/preferences", path)).await.json();
        assert_eq!(prefs["preferences"]["activity"]["activity_type"], "outdoor");
        assert_eq!(prefs["preferences"]["timing"]["preferred_day"], "Weekend");

        let reset: Value = app
            .server
            .post(&format!("{}/reset", path))
            .json(&json!({"resend": false}))
            .await
            .json();
        assert_eq!(reset["participant"]["status"], "invited");
        assert!(reset.get("delivery").is_none());
        assert!(app.sms.sent().is_empty());

        let prefs: Value = app.server.get(&format!("{}/preferences", path)).await.json();
        assert!(prefs["preferences"].get("activity").is_none());
        assert!(prefs["preferences"].get("contact").is_some());
    }

    #[tokio::test]
    async fn test_reset_resends_by_default() {
        let app = test_app().build().await;
        let id = create_activity(&app).await;
        let pid = add_one(&app, &id, "5551112222", None).await;

        let reset: Value = app
            .server
            .post(&format!("/api/v1/activities/{}/participants/{}/reset", id, pid))
            .await
            .json();
        assert_eq!(reset["delivery"]["sent"], 1);
        assert_eq!(app.sms.sent().len(), 1);
    }
}
