//! Activity API endpoints
//!
//! - POST   /api/v1/activities - Create an activity and invite participants
//! - GET    /api/v1/activities - List activities
//! - GET    /api/v1/activities/{id} - Activity with participants, stats and latest plan
//! - PUT    /api/v1/activities/{id} - Update activity fields
//! - DELETE /api/v1/activities/{id} - Delete an activity and everything in it
//! - GET    /api/v1/activities/{id}/stats - Response statistics
//! - GET    /api/v1/activities/{id}/messages - Message log
//! - GET    /api/v1/activities/{id}/feedback - Plan feedback with participant names

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    Activity, ActivityDetail, CreateActivityInput, FeedbackEntry, Message, Participant,
    ResponseStats, UpdateActivityInput,
};
use crate::notify::{DeliveryReport, NotifyChannels};

#[derive(Debug, Deserialize)]
pub struct CreateActivityRequest {
    #[serde(flatten)]
    pub activity: CreateActivityInput,
    /// Create the activity without texting or emailing anyone
    #[serde(default)]
    pub skip_invitations: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateActivityResponse {
    pub activity: Activity,
    pub organizer: Option<Participant>,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitations: Option<DeliveryReport>,
}

#[derive(Debug, Serialize)]
pub struct ActivityListResponse {
    pub activities: Vec<Activity>,
}

#[derive(Debug, Serialize)]
pub struct MessageLogResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackListResponse {
    pub feedback: Vec<FeedbackEntry>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_activities).post(create_activity))
        .route(
            "/{id}",
            get(get_activity).put(update_activity).delete(delete_activity),
        )
        .route("/{id}/stats", get(get_stats))
        .route("/{id}/messages", get(get_messages))
        .route("/{id}/feedback", get(get_feedback))
}

/// POST /api/v1/activities
async fn create_activity(
    State(state): State<AppState>,
    Json(body): Json<CreateActivityRequest>,
) -> Result<(StatusCode, Json<CreateActivityResponse>), ApiError> {
    let created = state.services.activities.create(body.activity).await?;

    let invitations = if body.skip_invitations {
        None
    } else {
        let invitees: Vec<Participant> = created.invitees().cloned().collect();
        let organizer_name = created.organizer.as_ref().and_then(|o| o.name.as_deref());
        Some(
            state
                .notifier
                .invite_all(&invitees, organizer_name, NotifyChannels::default())
                .await,
        )
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateActivityResponse {
            activity: created.activity,
            organizer: created.organizer,
            participants: created.participants,
            invitations,
        }),
    ))
}

/// GET /api/v1/activities
async fn list_activities(
    State(state): State<AppState>,
) -> Result<Json<ActivityListResponse>, ApiError> {
    let activities = state.services.activities.list().await?;
    Ok(Json(ActivityListResponse { activities }))
}

/// GET /api/v1/activities/{id}
async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActivityDetail>, ApiError> {
    Ok(Json(state.services.activities.detail(&id).await?))
}

/// PUT /api/v1/activities/{id}
async fn update_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateActivityInput>,
) -> Result<Json<Activity>, ApiError> {
    Ok(Json(state.services.activities.update(&id, input).await?))
}

/// DELETE /api/v1/activities/{id}
async fn delete_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.services.activities.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/activities/{id}/stats
async fn get_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResponseStats>, ApiError> {
    Ok(Json(state.services.activities.stats(&id).await?))
}

/// GET /api/v1/activities/{id}/messages
async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageLogResponse>, ApiError> {
    let messages = state.services.conversation.message_log(&id).await?;
    Ok(Json(MessageLogResponse { messages }))
}

/// GET /api/v1/activities/{id}/feedback
async fn get_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FeedbackListResponse>, ApiError> {
    state.services.activities.get(&id).await?;
    let feedback = state.services.preferences.feedback_for_activity(&id).await?;
    Ok(Json(FeedbackListResponse { feedback }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::api::test_support::{test_app, PUBLIC_URL};

    fn new_activity() -> Value {
        json!({
            "title": "Saturday hike",
            "location_address": "Mount Tam",
            "organizer": {"phone_number": "555-123-4567", "name": "Robin"},
            "participants": [
                {"phone_number": "(555) 222-3333", "email": "sam@example.com", "name": "Sam"},
                {"phone_number": "5554445555"}
            ]
        })
    }

    #[tokio::test]
    async fn test_create_activity_invites_everyone_but_organizer() {
        let app = test_app().build().await;

        let response = app.server.post("/api/v1/activities").json(&new_activity()).await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();

        assert_eq!(body["activity"]["title"], "Saturday hike");
        assert_eq!(body["activity"]["status"], "planning");
        assert_eq!(body["participants"].as_array().unwrap().len(), 3);
        assert_eq!(body["organizer"]["phone_number"], "+15551234567");
        // Two texts, one email; the second invitee has no email address
        assert_eq!(body["invitations"]["sent"], 3);
        assert_eq!(body["invitations"]["skipped"], 1);

        let texts = app.sms.sent();
        assert_eq!(texts.len(), 2);
        assert!(texts.iter().all(|(to, _)| to != "+15551234567"));
        assert!(texts[0].1.contains("Help Robin plan your group activity"));
        let link = format!(
            "{}/activity/{}",
            PUBLIC_URL,
            body["activity"]["id"].as_str().unwrap()
        );
        assert!(texts[0].1.contains(&link));

        let emails = app.email.sent();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, "sam@example.com");
        assert_eq!(emails[0].1, "Welcome to Group Activity Planner!");
    }

    #[tokio::test]
    async fn test_duplicate_phone_invites_merged_email() {
        let app = test_app().build().await;

        let response = app
            .server
            .post("/api/v1/activities")
            .json(&json!({
                "participants": [
                    {"phone_number": "5550000002"},
                    {"phone_number": "(555) 000-0002", "email": "blair@example.com", "name": "Blair"}
                ]
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();

        assert_eq!(body["participants"].as_array().unwrap().len(), 1);
        assert_eq!(body["participants"][0]["email"], "blair@example.com");
        assert_eq!(body["participants"][0]["name"], "Blair");
        assert_eq!(body["invitations"]["sent"], 2);

        let emails = app.email.sent();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, "blair@example.com");
    }

    #[tokio::test]
    async fn test_create_activity_skip_invitations() {
        let app = test_app().build().await;

        let mut body = new_activity();
        body["skip_invitations"] = json!(true);
        let response = app.server.post("/api/v1/activities").json(&body).await;
        response.assert_status(StatusCode::CREATED);

        let body: Value = response.json();
        assert!(body.get("invitations").is_none());
        assert!(app.sms.sent().is_empty());
        assert!(app.email.sent().is_empty());
    }

    #[tokio::test]
    async fn test_create_activity_rejects_bad_phone() {
        let app = test_app().build().await;

        let response = app
            .server
            .post("/api/v1/activities")
            .json(&json!({"participants": [{"phone_number": "call me"}]}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_activity_detail_update_and_delete() {
        let app = test_app().build().await;
        let created: Value = app
            .server
            .post("/api/v1/activities")
            .json(&json!({"title": "Picnic", "skip_invitations": true}))
            .await
            .json();
        let id = created["activity"]["id"].as_str().unwrap().to_string();
        let path = format!("/api/v1/activities/{}", id);

        let detail: Value = app.server.get(&path).await.json();
        assert_eq!(detail["activity"]["title"], "Picnic");
        assert_eq!(detail["stats"]["total"], 0);
        assert!(detail["latest_plan"].is_null());

        let updated: Value = app
            .server
            .put(&path)
            .json(&json!({"time_window": "Afternoon", "location_address": "Dolores Park"}))
            .await
            .json();
        assert_eq!(updated["time_window"], "Afternoon");
        assert_eq!(updated["title"], "Picnic");

        let list: Value = app.server.get("/api/v1/activities").await.json();
        assert_eq!(list["activities"].as_array().unwrap().len(), 1);

        app.server.delete(&path).await.assert_status(StatusCode::NO_CONTENT);
        app.server.get(&path).await.assert_status(StatusCode::NOT_FOUND);
        app.server.delete(&path).await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_messages_and_feedback_for_missing_activity() {
        let app = test_app().build().await;

        for suffix in ["stats", "messages", "feedback"] {
            let response = app
                .server
                .get(&format!("/api/v1/activities/missing/{}", suffix))
                .await;
            response.assert_status(StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_invitations_are_logged_as_messages() {
        let app = test_app().build().await;
        let created: Value = app
            .server
            .post("/api/v1/activities")
            .json(&json!({"participants": [{"phone_number": "5552223333"}]}))
            .await
            .json();
        let id = created["activity"]["id"].as_str().unwrap();

        let log: Value = app
            .server
            .get(&format!("/api/v1/activities/{}/messages", id))
            .await
            .json();
        let messages = log["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["direction"], "outgoing");
        assert_eq!(messages[0]["channel"], "sms");
    }
}
