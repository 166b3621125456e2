//! Services layer - Business logic
//!
//! This module contains all business logic services for Gatherly.
//! Services are responsible for:
//! - Implementing business rules and status transitions
//! - Coordinating between repositories and the planning assistant
//! - Handling validation and error cases

pub mod activity;
pub mod assistant;
pub mod conversation;
pub mod keyword;
pub mod participant;
pub mod phone;
pub mod planner;
pub mod preference;
pub mod questionnaire;
pub mod rate_limiter;

pub use activity::{ActivityService, ActivityServiceError, CreatedActivity};
pub use assistant::{CreatorReply, ExtractedInfo, ParticipantReply, PlanningAssistant, ReplySource};
pub use conversation::{
    ChatOutcome, ConversationService, ConversationServiceError, ConverseOutcome,
    CreatorInputOutcome,
};
pub use keyword::KeywordAssistant;
pub use participant::{ParticipantService, ParticipantServiceError};
pub use phone::{format_phone_number, normalize_phone_number};
pub use planner::{generate_plan, PlanService, PlanServiceError};
pub use preference::{PreferenceService, PreferenceServiceError};
pub use questionnaire::{QuestionBatch, QuestionnaireService, SubmitOutcome};
pub use rate_limiter::ConversationRateLimiter;

use std::sync::Arc;

use crate::db::repositories::{
    SqlxActivityRepository, SqlxMessageRepository, SqlxParticipantRepository, SqlxPlanRepository,
    SqlxPreferenceRepository,
};
use crate::db::DynDatabasePool;
use crate::llm::LlmClient;

/// Every service wired against one database pool
#[derive(Clone)]
pub struct Services {
    pub activities: Arc<ActivityService>,
    pub participants: Arc<ParticipantService>,
    pub preferences: Arc<PreferenceService>,
    pub questionnaire: Arc<QuestionnaireService>,
    pub plans: Arc<PlanService>,
    pub conversation: Arc<ConversationService>,
    pub assistant: Arc<PlanningAssistant>,
}

impl Services {
    pub fn new(pool: DynDatabasePool, llm: Option<Arc<dyn LlmClient>>) -> Self {
        let activity_repo = SqlxActivityRepository::boxed(pool.clone());
        let participant_repo = SqlxParticipantRepository::boxed(pool.clone());
        let plan_repo = SqlxPlanRepository::boxed(pool.clone());
        let message_repo = SqlxMessageRepository::boxed(pool.clone());
        let preference_repo = SqlxPreferenceRepository::boxed(pool);

        let assistant = Arc::new(PlanningAssistant::new(llm));
        let preferences = Arc::new(PreferenceService::new(
            preference_repo,
            participant_repo.clone(),
        ));
        let participants = Arc::new(ParticipantService::new(
            participant_repo,
            activity_repo.clone(),
            preferences.clone(),
        ));
        let activities = Arc::new(ActivityService::new(
            activity_repo,
            plan_repo.clone(),
            participants.clone(),
        ));
        let questionnaire = Arc::new(QuestionnaireService::new(
            participants.clone(),
            preferences.clone(),
        ));
        let plans = Arc::new(PlanService::new(
            plan_repo,
            activities.clone(),
            participants.clone(),
            preferences.clone(),
            assistant.clone(),
        ));
        let conversation = Arc::new(ConversationService::new(
            message_repo,
            activities.clone(),
            participants.clone(),
            preferences.clone(),
            plans.clone(),
            assistant.clone(),
        ));

        Self {
            activities,
            participants,
            preferences,
            questionnaire,
            plans,
            conversation,
            assistant,
        }
    }
}
