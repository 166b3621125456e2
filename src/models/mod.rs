//! Data models
//!
//! This module contains the data structures used throughout Gatherly:
//! - Database entities (Activity, Participant, Preference, Message, Plan)
//! - Status enums with their allowed transitions
//! - API request/response types

mod activity;
mod message;
mod participant;
mod plan;
mod preference;

pub use activity::{
    Activity, ActivityDetail, ActivityStatus, CreateActivityInput, NewParticipantInput,
    OrganizerInput, ResponseStats, UpdateActivityInput,
};
pub(crate) use activity::non_blank;
pub use message::{Channel, ChatRole, ChatTurn, Direction, Message};
pub use participant::{Participant, ParticipantStatus, UpdateParticipantInput};
pub use plan::{Plan, PlanDraft, PlanSource, PlanStatus, ScheduleItem};
pub use preference::{
    decode_value, encode_value, is_blank, is_truthy, to_category_map, ActivityPreferences,
    CategoryMap, FeedbackEntry, Preference, CONTACT_CATEGORY, FEEDBACK_CATEGORY, GROUP_KEY,
    PLAN_FEEDBACK_KEY,
};

/// A status string that matches no known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);
