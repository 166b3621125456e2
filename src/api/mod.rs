//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints for Gatherly:
//! - Activity endpoints (create, detail, stats, message log, feedback)
//! - Participant endpoints (bulk add, invitations, reset, preferences)
//! - Questionnaire endpoints
//! - Conversation endpoints (participant chat, organizer assistant)
//! - Plan endpoints (generate, revise, finalize)
//! - Inbound SMS webhook
//! - Health check

pub mod activities;
pub mod conversation;
pub mod health;
pub mod middleware;
pub mod participants;
pub mod plans;
pub mod questionnaire;
pub mod webhooks;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, RequestStats};

/// Build the main API router
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .nest("/health", health::router())
        .nest("/activities", activities::router())
        .nest("/activities/{id}/participants", participants::router())
        .nest(
            "/activities/{id}/participants/{pid}",
            questionnaire::router().merge(conversation::participant_router()),
        )
        .nest("/activities/{id}/plans", plans::router())
        .route(
            "/activities/{id}/invitations",
            axum::routing::post(participants::resend_pending_invitations),
        )
        .route(
            "/activities/{id}/converse",
            axum::routing::post(conversation::organizer_converse),
        )
        .route(
            "/assistant/activity-input",
            axum::routing::post(conversation::activity_input),
        )
        .nest("/webhooks", webhooks::router())
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!("Invalid CORS origin '{}', allowing any origin", cors_origin);
            AllowOrigin::any()
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .nest("/api/v1", build_api_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
pub mod test_support {
    use axum_test::TestServer;
    use chrono::Duration;
    use std::sync::Arc;

    use super::*;
    use crate::db::{create_test_pool, migrations, repositories::SqlxMessageRepository};
    use crate::llm::LlmClient;
    use crate::notify::mock::{RecordingEmail, RecordingSms};
    use crate::notify::Notifier;
    use crate::services::{ConversationRateLimiter, Services};

    pub const PUBLIC_URL: &str = "https://plan.example.com";

    pub struct TestApp {
        pub server: TestServer,
        pub state: AppState,
        pub sms: Arc<RecordingSms>,
        pub email: Arc<RecordingEmail>,
    }

    pub struct TestAppBuilder {
        llm: Option<Arc<dyn LlmClient>>,
        sms: RecordingSms,
        conversation_limit: usize,
    }

    impl TestAppBuilder {
        pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
            self.llm = Some(llm);
            self
        }

        pub fn sms(mut self, sms: RecordingSms) -> Self {
            self.sms = sms;
            self
        }

        pub fn conversation_limit(mut self, limit: usize) -> Self {
            self.conversation_limit = limit;
            self
        }

        pub async fn build(self) -> TestApp {
            let pool = create_test_pool().await.expect("Failed to create test pool");
            migrations::run_migrations(&pool)
                .await
                .expect("Failed to run migrations");

            let sms = Arc::new(self.sms);
            let email = Arc::new(RecordingEmail::default());
            let notifier = Notifier::new(
                sms.clone(),
                email.clone(),
                SqlxMessageRepository::boxed(pool.clone()),
                PUBLIC_URL,
            );
            let state = AppState {
                services: Services::new(pool.clone(), self.llm),
                pool,
                notifier: Arc::new(notifier),
                limiter: Arc::new(ConversationRateLimiter::new(
                    self.conversation_limit,
                    Duration::minutes(10),
                )),
                request_stats: Arc::new(RequestStats::new()),
            };

            let server = TestServer::new(build_router(state.clone(), "http://localhost:3000"))
                .expect("Failed to start test server");
            TestApp {
                server,
                state,
                sms,
                email,
            }
        }
    }

    pub fn test_app() -> TestAppBuilder {
        TestAppBuilder {
            llm: None,
            sms: RecordingSms::default(),
            conversation_limit: 20,
        }
    }

    /// Activity with a single participant, no invitations sent.
    /// Returns (activity id, participant id).
    pub async fn with_participant(app: &TestApp) -> (String, String) {
        let created: serde_json::Value = app
            .server
            .post("/api/v1/activities")
            .json(&serde_json::json!({
                "title": "Team outing",
                "participants": [{"phone_number": "5558675309", "email": "lee@example.com"}],
                "skip_invitations": true
            }))
            .await
            .json();
        (
            created["activity"]["id"].as_str().unwrap().to_string(),
            created["participants"][0]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Answer every questionnaire batch, leaving the participant complete
    pub async fn answer_all_batches(app: &TestApp, activity_id: &str, participant_id: &str) {
        let batches = [
            serde_json::json!({"email": "lee@example.com", "name": "Lee", "allow_group_text": true}),
            serde_json::json!({"group_size": 4, "has_children": true, "has_seniors": false}),
            serde_json::json!({"preferred_day": "Weekend", "preferred_time": "Morning", "duration": "Half day"}),
            serde_json::json!({"activity_type": ["Outdoor"], "walking_preference": "Moderate", "budget_range": "$25-$50"}),
            serde_json::json!({"additional_info": "Bring snacks"}),
        ];
        for answers in batches {
            app.server
                .post(&format!(
                    "/api/v1/activities/{}/participants/{}/answers",
                    activity_id, participant_id
                ))
                .json(&serde_json::json!({ "answers": answers }))
                .await
                .assert_status_ok();
        }
    }
}
