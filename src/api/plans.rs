//! Plan API endpoints
//!
//! - POST /api/v1/activities/{id}/plans - Generate a plan
//! - GET  /api/v1/activities/{id}/plans - List plans, newest first
//! - GET  /api/v1/activities/{id}/plans/latest - Latest plan
//! - GET  /api/v1/activities/{id}/plans/{plan_id} - One plan
//! - POST /api/v1/activities/{id}/plans/{plan_id}/feedback - Revise with feedback
//! - POST /api/v1/activities/{id}/plans/{plan_id}/finalize - Finalize
//!
//! Participants are only notified when `send_notifications` is set.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{Activity, Plan};
use crate::notify::DeliveryReport;

#[derive(Debug, Default, Deserialize)]
pub struct GeneratePlanRequest {
    /// Let the assistant draft the plan; the heuristic planner is the fallback
    #[serde(default)]
    pub use_assistant: bool,
    #[serde(default)]
    pub send_notifications: bool,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback: String,
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub send_notifications: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub send_notifications: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub plan: Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<DeliveryReport>,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub plan: Plan,
    pub activity: Activity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<DeliveryReport>,
}

#[derive(Debug, Serialize)]
pub struct PlanListResponse {
    pub plans: Vec<Plan>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_plans).post(generate_plan))
        .route("/latest", get(latest_plan))
        .route("/{plan_id}", get(get_plan))
        .route("/{plan_id}/feedback", post(submit_feedback))
        .route("/{plan_id}/finalize", post(finalize_plan))
}

/// POST /api/v1/activities/{id}/plans
async fn generate_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<GeneratePlanRequest>>,
) -> Result<(StatusCode, Json<PlanResponse>), ApiError> {
    let Json(body) = body.unwrap_or_default();
    let plan = state.services.plans.generate(&id, body.use_assistant).await?;

    let notifications = if body.send_notifications {
        let activity = state.services.activities.get(&id).await?;
        let participants = state.services.participants.list(&id).await?;
        Some(
            state
                .notifier
                .plan_ready(&activity, &plan, &participants)
                .await,
        )
    } else {
        None
    };

    Ok((
        StatusCode::CREATED,
        Json(PlanResponse {
            plan,
            notifications,
        }),
    ))
}

/// GET /api/v1/activities/{id}/plans
async fn list_plans(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlanListResponse>, ApiError> {
    let plans = state.services.plans.list(&id).await?;
    Ok(Json(PlanListResponse { plans }))
}

/// GET /api/v1/activities/{id}/plans/latest
async fn latest_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Plan>, ApiError> {
    state
        .services
        .plans
        .latest(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Activity {} has no plan yet", id)))
}

/// GET /api/v1/activities/{id}/plans/{plan_id}
async fn get_plan(
    State(state): State<AppState>,
    Path((id, plan_id)): Path<(String, String)>,
) -> Result<Json<Plan>, ApiError> {
    Ok(Json(
        state.services.plans.get_in_activity(&id, &plan_id).await?,
    ))
}

/// POST /api/v1/activities/{id}/plans/{plan_id}/feedback
async fn submit_feedback(
    State(state): State<AppState>,
    Path((id, plan_id)): Path<(String, String)>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<PlanResponse>, ApiError> {
    let plan = state
        .services
        .plans
        .revise(&id, &plan_id, &body.feedback, body.participant_id.as_deref())
        .await?;

    let notifications = if body.send_notifications {
        let activity = state.services.activities.get(&id).await?;
        let participants = state.services.participants.list(&id).await?;
        Some(state.notifier.plan_updated(&activity, &participants).await)
    } else {
        None
    };

    Ok(Json(PlanResponse {
        plan,
        notifications,
    }))
}

/// POST /api/v1/activities/{id}/plans/{plan_id}/finalize
async fn finalize_plan(
    State(state): State<AppState>,
    Path((id, plan_id)): Path<(String, String)>,
    body: Option<Json<FinalizeRequest>>,
) -> Result<Json<FinalizeResponse>, ApiError> {
    let Json(body) = body.unwrap_or_default();
    let (plan, activity) = state.services.plans.finalize(&id, &plan_id).await?;

    let notifications = if body.send_notifications {
        let participants = state.services.participants.list(&id).await?;
        Some(
            state
                .notifier
                .plan_finalized(&activity, &plan, &participants)
                .await,
        )
    } else {
        None
    };

    Ok(Json(FinalizeResponse {
        plan,
        activity,
        notifications,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use std::sync::Arc;

    use crate::api::test_support::{answer_all_batches, test_app, with_participant, TestApp};
    use crate::llm::client::mock::ScriptedLlm;

    async fn ready_activity(app: &TestApp) -> (String, String) {
        let (id, pid) = with_participant(app).await;
        answer_all_batches(app, &id, &pid).await;
        (id, pid)
    }

    #[tokio::test]
    async fn test_generate_requires_completed_participant() {
        let app = test_app().build().await;
        let (id, _) = with_participant(&app).await;

        let response = app
            .server
            .post(&format!("/api/v1/activities/{}/plans", id))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"]["details"]["reason"], "not_ready");

        app.server
            .get(&format!("/api/v1/activities/{}/plans/latest", id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_generate_heuristic_plan_without_notifications() {
        let app = test_app().build().await;
        let (id, _) = ready_activity(&app).await;

        let response = app
            .server
            .post(&format!("/api/v1/activities/{}/plans", id))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();

        assert_eq!(body["plan"]["title"], "Park Visit - Weekend Half day Event");
        assert_eq!(body["plan"]["status"], "draft");
        assert_eq!(body["plan"]["source"], "heuristic");
        assert!(body["plan"]["description"]
            .as_str()
            .unwrap()
            .contains("child-friendly"));
        assert!(body.get("notifications").is_none());
        assert!(app.email.sent().is_empty());

        let detail: Value = app
            .server
            .get(&format!("/api/v1/activities/{}", id))
            .await
            .json();
        assert_eq!(detail["activity"]["status"], "planned");
        assert_eq!(detail["latest_plan"]["id"], body["plan"]["id"]);
    }

    #[tokio::test]
    async fn test_generate_with_assistant_and_notifications() {
        let llm = ScriptedLlm::replying(
            r#"```json
{"title": "Harbor Kayak Morning", "description": "Paddle and brunch.", "schedule": [{"time": "9:00 AM", "activity": "Launch"}], "alternatives": ["Beach day"]}
```"#,
        );
        let app = test_app().llm(Arc::new(llm)).build().await;
        let (id, _) = ready_activity(&app).await;

        let body: Value = app
            .server
            .post(&format!("/api/v1/activities/{}/plans", id))
            .json(&json!({"use_assistant": true, "send_notifications": true}))
            .await
            .json();
        assert_eq!(body["plan"]["title"], "Harbor Kayak Morning");
        assert_eq!(body["plan"]["source"], "assistant");
        assert_eq!(body["notifications"]["sent"], 2);

        let emails = app.email.sent();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].1, "Your Group Activity Plan: Harbor Kayak Morning");
        let texts = app.sms.sent();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].1.contains("Your group activity plan is ready!"));
    }

    #[tokio::test]
    async fn test_feedback_then_finalize() {
        let app = test_app().build().await;
        let (id, pid) = ready_activity(&app).await;
        let created: Value = app
            .server
            .post(&format!("/api/v1/activities/{}/plans", id))
            .await
            .json();
        let plan_id = created["plan"]["id"].as_str().unwrap().to_string();
        let plan_path = format!("/api/v1/activities/{}/plans/{}", id, plan_id);

        app.server
            .post(&format!("{}/feedback", plan_path))
            .json(&json!({"feedback": "  "}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let revised: Value = app
            .server
            .post(&format!("{}/feedback", plan_path))
            .json(&json!({"feedback": "Can we start later?", "participant_id": pid}))
            .await
            .json();
        assert_eq!(revised["plan"]["status"], "revised");
        assert!(revised["plan"]["description"]
            .as_str()
            .unwrap()
            .ends_with("Revisions based on feedback:\nCan we start later?"));

        let feedback: Value = app
            .server
            .get(&format!("/api/v1/activities/{}/feedback", id))
            .await
            .json();
        assert_eq!(feedback["feedback"][0]["feedback"], "Can we start later?");
        assert_eq!(feedback["feedback"][0]["participant_name"], "Lee");

        let finalized: Value = app
            .server
            .post(&format!("{}/finalize", plan_path))
            .json(&json!({"send_notifications": true}))
            .await
            .json();
        assert_eq!(finalized["plan"]["status"], "final");
        assert_eq!(finalized["activity"]["status"], "finalized");
        let emails = app.email.sent();
        assert_eq!(emails.len(), 1);
        assert!(emails[0].1.starts_with("FINAL: Your Group Activity Plan"));

        // Nothing moves once final
        app.server
            .post(&format!("{}/feedback", plan_path))
            .json(&json!({"feedback": "One more thing"}))
            .await
            .assert_status(StatusCode::CONFLICT);
        app.server
            .post(&format!("{}/finalize", plan_path))
            .await
            .assert_status(StatusCode::CONFLICT);
        app.server
            .post(&format!("/api/v1/activities/{}/plans", id))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_plan_lookup_is_scoped_to_activity() {
        let app = test_app().build().await;
        let (id, _) = ready_activity(&app).await;
        let created: Value = app
            .server
            .post(&format!("/api/v1/activities/{}/plans", id))
            .await
            .json();
        let plan_id = created["plan"]["id"].as_str().unwrap();

        let (other, _) = with_participant(&app).await;
        app.server
            .get(&format!("/api/v1/activities/{}/plans/{}", other, plan_id))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let list: Value = app
            .server
            .get(&format!("/api/v1/activities/{}/plans", id))
            .await
            .json();
        assert_eq!(list["plans"].as_array().unwrap().len(), 1);
        let latest: Value = app
            .server
            .get(&format!("/api/v1/activities/{}/plans/latest", id))
            .await
            .json();
        assert_eq!(latest["id"], plan_id);
    }
}
