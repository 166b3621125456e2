//! Conversation service
//!
//! Free-form flows backed by the planning assistant:
//! - Organizer conversation that produces a quick plan
//! - Participant chat that collects preferences
//! - Stateless extraction of activity details from organizer text
//!
//! Web conversations are persisted in the message log and replayed as
//! history on the next call.

use crate::db::repositories::MessageRepository;
use crate::models::{
    Activity, CategoryMap, Channel, ChatTurn, Direction, Message, Participant, ParticipantStatus,
    Plan,
};
use crate::services::activity::{ActivityService, ActivityServiceError};
use crate::services::assistant::{ExtractedInfo, PlanningAssistant, ReplySource};
use crate::services::participant::{ParticipantService, ParticipantServiceError};
use crate::services::planner::{PlanService, PlanServiceError};
use crate::services::preference::{PreferenceService, PreferenceServiceError};
use anyhow::Context;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const BASIC_PLAN_MESSAGE: &str =
    "I've created a basic plan based on your input. Please let me know if you'd like to adjust anything.";

/// Error types for conversation operations
#[derive(Debug, thiserror::Error)]
pub enum ConversationServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<ActivityServiceError> for ConversationServiceError {
    fn from(err: ActivityServiceError) -> Self {
        match err {
            ActivityServiceError::NotFound(msg) => Self::NotFound(msg),
            ActivityServiceError::ValidationError(msg) => Self::ValidationError(msg),
            ActivityServiceError::Conflict(msg) => Self::Conflict(msg),
            ActivityServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

impl From<ParticipantServiceError> for ConversationServiceError {
    fn from(err: ParticipantServiceError) -> Self {
        ActivityServiceError::from(err).into()
    }
}

impl From<PreferenceServiceError> for ConversationServiceError {
    fn from(err: PreferenceServiceError) -> Self {
        match err {
            PreferenceServiceError::ValidationError(msg) => Self::ValidationError(msg),
            PreferenceServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

impl From<PlanServiceError> for ConversationServiceError {
    fn from(err: PlanServiceError) -> Self {
        match err {
            PlanServiceError::NotFound(msg) => Self::NotFound(msg),
            PlanServiceError::ValidationError(msg) => Self::ValidationError(msg),
            PlanServiceError::Conflict(msg) | PlanServiceError::NotReady(msg) => {
                Self::Conflict(msg)
            }
            PlanServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Result of one organizer conversation turn
#[derive(Debug, Clone, Serialize)]
pub struct ConverseOutcome {
    pub activity: Activity,
    pub plan: Plan,
    pub message: String,
    pub extracted_info: ExtractedInfo,
    pub source: ReplySource,
}

/// Result of one participant chat turn
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub participant: Participant,
    pub message: String,
    pub extracted_preferences: CategoryMap,
    /// Number of preference values stored
    pub saved: usize,
    pub source: ReplySource,
}

/// Result of a stateless organizer extraction
#[derive(Debug, Clone, Serialize)]
pub struct CreatorInputOutcome {
    pub message: String,
    pub extracted_info: ExtractedInfo,
    pub source: ReplySource,
    /// The activity after filling empty fields, when one was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
}

fn require_text(text: &str) -> Result<&str, ConversationServiceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ConversationServiceError::ValidationError(
            "Message must not be empty".to_string(),
        ));
    }
    Ok(text)
}

pub struct ConversationService {
    messages: Arc<dyn MessageRepository>,
    activities: Arc<ActivityService>,
    participants: Arc<ParticipantService>,
    preferences: Arc<PreferenceService>,
    plans: Arc<PlanService>,
    assistant: Arc<PlanningAssistant>,
}

impl ConversationService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        activities: Arc<ActivityService>,
        participants: Arc<ParticipantService>,
        preferences: Arc<PreferenceService>,
        plans: Arc<PlanService>,
        assistant: Arc<PlanningAssistant>,
    ) -> Self {
        Self {
            messages,
            activities,
            participants,
            preferences,
            plans,
            assistant,
        }
    }

    /// Append a message to the log
    pub async fn record(&self, message: Message) -> Result<Message, ConversationServiceError> {
        Ok(self
            .messages
            .create(&message)
            .await
            .context("Failed to record message")?)
    }

    /// Every message of an activity, oldest first
    pub async fn message_log(
        &self,
        activity_id: &str,
    ) -> Result<Vec<Message>, ConversationServiceError> {
        self.activities.get(activity_id).await?;
        Ok(self
            .messages
            .list_by_activity(activity_id)
            .await
            .context("Failed to list messages")?)
    }

    /// Stored web conversation with the organizer (`None`) or a participant
    pub async fn history(
        &self,
        activity_id: &str,
        participant_id: Option<&str>,
    ) -> Result<Vec<ChatTurn>, ConversationServiceError> {
        let messages = self
            .messages
            .conversation(activity_id, participant_id)
            .await
            .context("Failed to load conversation")?;
        Ok(messages.iter().map(ChatTurn::from).collect())
    }

    async fn record_turn(
        &self,
        activity_id: &str,
        participant_id: Option<&str>,
        incoming: &str,
        reply: &str,
        source: ReplySource,
    ) -> Result<(), ConversationServiceError> {
        self.record(Message::new(
            activity_id,
            participant_id,
            Direction::Incoming,
            Channel::Web,
            incoming,
        ))
        .await?;
        self.record(
            Message::new(
                activity_id,
                participant_id,
                Direction::Outgoing,
                Channel::Web,
                reply,
            )
            .with_metadata(json!({ "source": source })),
        )
        .await?;
        Ok(())
    }

    /// One organizer turn: reply with the stored history as context, then
    /// build a quick plan from what the organizer said
    pub async fn organizer_converse(
        &self,
        activity_id: &str,
        input: &str,
    ) -> Result<ConverseOutcome, ConversationServiceError> {
        let input = require_text(input)?;
        let mut activity = self.activities.get(activity_id).await?;
        if activity.is_finalized() {
            return Err(ConversationServiceError::Conflict(format!(
                "Activity {} is finalized",
                activity_id
            )));
        }

        let history = self.history(activity_id, None).await?;
        let reply = self.assistant.creator_reply(input, &history).await;
        let message = if reply.message.trim().is_empty() {
            tracing::warn!("Assistant returned an empty reply for activity {}", activity_id);
            BASIC_PLAN_MESSAGE.to_string()
        } else {
            reply.message
        };
        self.record_turn(activity_id, None, input, &message, reply.source)
            .await?;

        let plan = self
            .plans
            .generate_quick_plan(&mut activity, input, &reply.extracted_info)
            .await?;

        Ok(ConverseOutcome {
            activity,
            plan,
            message,
            extracted_info: reply.extracted_info,
            source: reply.source,
        })
    }

    /// One participant chat turn. `history` defaults to the stored
    /// conversation; extracted preferences are saved and an invited
    /// participant becomes active.
    pub async fn participant_chat(
        &self,
        activity_id: &str,
        participant_id: &str,
        message: &str,
        history: Option<Vec<ChatTurn>>,
    ) -> Result<ChatOutcome, ConversationServiceError> {
        let message = require_text(message)?;
        let activity = self.activities.get(activity_id).await?;
        let mut participant = self
            .participants
            .get_in_activity(activity_id, participant_id)
            .await?;

        let history = match history {
            Some(turns) => turns,
            None => self.history(activity_id, Some(participant_id)).await?,
        };

        let reply = self
            .assistant
            .participant_reply(message, &history, &activity)
            .await;
        let saved = self
            .preferences
            .save_map(activity_id, Some(participant_id), &reply.extracted_preferences)
            .await?;

        if participant.status == ParticipantStatus::Invited {
            self.participants
                .transition(&mut participant, ParticipantStatus::Active)
                .await?;
        }
        self.record_turn(
            activity_id,
            Some(participant_id),
            message,
            &reply.message,
            reply.source,
        )
        .await?;

        tracing::debug!(
            "Chat turn for participant {} saved {} preferences",
            participant_id,
            saved
        );
        Ok(ChatOutcome {
            participant,
            message: reply.message,
            extracted_preferences: reply.extracted_preferences,
            saved,
            source: reply.source,
        })
    }

    /// Extract activity details from organizer text. Nothing is recorded;
    /// when an activity is given its empty fields are filled in.
    pub async fn creator_input(
        &self,
        message: &str,
        history: &[ChatTurn],
        activity_id: Option<&str>,
    ) -> Result<CreatorInputOutcome, ConversationServiceError> {
        let message = require_text(message)?;
        let mut activity = match activity_id {
            Some(id) => Some(self.activities.get(id).await?),
            None => None,
        };

        let reply = self.assistant.creator_reply(message, history).await;

        if let Some(current) = activity.as_mut() {
            if !current.is_finalized() && reply.extracted_info.fill_activity(current) {
                *current = self.activities.save(current).await?;
            }
        }

        Ok(CreatorInputOutcome {
            message: reply.message,
            extracted_info: reply.extracted_info,
            source: reply.source,
            activity,
        })
    }
}
