//! Provider webhooks
//!
//! - POST /api/v1/webhooks/sms - Inbound text message (form fields `From`, `Body`)
//!
//! The reply is TwiML; the provider texts the `<Message>` back to the sender.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Form, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{Channel, Direction, Message, Participant};
use crate::services::ConversationServiceError;

const UNKNOWN_SENDER_REPLY: &str = "Thank you for your message! Please use the web interface to interact with the Group Activity Planner.";

const ERROR_REPLY: &str =
    "Sorry, an error occurred. Please try again later or use the web interface.";

#[derive(Debug, Deserialize)]
pub struct InboundSms {
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "Body", default)]
    pub body: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/sms", post(sms_webhook))
}

/// Escape text for an XML element body
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn twiml(message: &str) -> Response {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n    <Message>{}</Message>\n</Response>\n",
        xml_escape(message)
    );
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

/// Log both sides of a text exchange with a known participant
async fn log_exchange(
    state: &AppState,
    participant: &Participant,
    from: &str,
    incoming: &str,
    reply: &str,
) -> Result<(), ConversationServiceError> {
    let conversation = &state.services.conversation;
    conversation
        .record(
            Message::new(
                &participant.activity_id,
                Some(&participant.id),
                Direction::Incoming,
                Channel::Sms,
                incoming,
            )
            .with_metadata(json!({ "from": from })),
        )
        .await?;
    conversation
        .record(Message::new(
            &participant.activity_id,
            Some(&participant.id),
            Direction::Outgoing,
            Channel::Sms,
            reply,
        ))
        .await?;
    Ok(())
}

/// POST /api/v1/webhooks/sms
async fn sms_webhook(
    State(state): State<AppState>,
    Form(sms): Form<InboundSms>,
) -> Result<Response, ApiError> {
    let from = sms.from.as_deref().map(str::trim).unwrap_or_default();
    let body = sms.body.as_deref().map(str::trim).unwrap_or_default();
    if from.is_empty() || body.is_empty() {
        return Err(ApiError::validation_error("Missing required parameters"));
    }

    let participant = match state.services.participants.find_latest_by_phone(from).await {
        Ok(found) => found,
        Err(e) => {
            tracing::error!("Failed to look up SMS sender: {}", e);
            return Ok(twiml(ERROR_REPLY));
        }
    };

    let Some(participant) = participant else {
        tracing::info!("SMS from unknown number");
        return Ok(twiml(UNKNOWN_SENDER_REPLY));
    };

    let reply = state.notifier.webhook_reply();
    if let Err(e) = log_exchange(&state, &participant, from, body, &reply).await {
        tracing::error!("Error processing SMS: {}", e);
        return Ok(twiml(ERROR_REPLY));
    }
    tracing::info!(
        "SMS from participant {} in activity {}",
        participant.id,
        participant.activity_id
    );
    Ok(twiml(&reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::Value;

    use crate::api::test_support::{test_app, with_participant, PUBLIC_URL};

    #[test]
    fn test_xml_escape() {
        assert_eq!(
            xml_escape(r#"Tom & "Jerry" <3 'cheese'"#),
            "Tom &amp; &quot;Jerry&quot; &lt;3 &apos;cheese&apos;"
        );
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[tokio::test]
    async fn test_known_sender_is_logged() {
        let app = test_app().build().await;
        let (id, pid) = with_participant(&app).await;

        let response = app
            .server
            .post("/api/v1/webhooks/sms")
            .form(&[("From", "+15558675309"), ("Body", "Is it still on?")])
            .await;
        response.assert_status_ok();
        let text = response.text();
        assert!(text.starts_with("<?xml"));
        assert!(text.contains(&format!("Visit {} to continue", PUBLIC_URL)));

        let log: Value = app
            .server
            .get(&format!("/api/v1/activities/{}/messages", id))
            .await
            .json();
        let messages = log["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        let incoming = messages
            .iter()
            .find(|m| m["direction"] == "incoming")
            .unwrap();
        assert_eq!(incoming["channel"], "sms");
        assert_eq!(incoming["participant_id"], pid.as_str());
        assert_eq!(incoming["content"], "Is it still on?");
    }

    #[tokio::test]
    async fn test_unknown_sender_gets_generic_reply() {
        let app = test_app().build().await;

        let response = app
            .server
            .post("/api/v1/webhooks/sms")
            .form(&[("From", "+15550000000"), ("Body", "hello <there>")])
            .await;
        response.assert_status_ok();
        assert!(response.text().contains("Please use the web interface"));
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let app = test_app().build().await;

        app.server
            .post("/api/v1/webhooks/sms")
            .form(&[("From", "+15550000000")])
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
