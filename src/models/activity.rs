//! Activity model
//!
//! This module provides:
//! - `Activity` entity representing an organizer-created group event
//! - `ActivityStatus` enum with its allowed transitions
//! - Input types for creating and updating activities
//! - `ResponseStats` summarising participant progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Participant, ParticipantStatus, Plan, UnknownStatus};

/// Activity entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// UUID v4 identifier
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Free-form date text as entered by the organizer
    pub proposed_date: Option<String>,
    /// Free-form time window ("Saturday afternoon")
    pub time_window: Option<String>,
    pub start_time: Option<String>,
    pub location_address: Option<String>,
    pub status: ActivityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    /// Create a new activity in the `planning` state
    pub fn new(input: &CreateActivityInput) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: non_blank(&input.title),
            description: non_blank(&input.description),
            proposed_date: non_blank(&input.proposed_date),
            time_window: non_blank(&input.time_window),
            start_time: non_blank(&input.start_time),
            location_address: non_blank(&input.location_address),
            status: ActivityStatus::Planning,
            created_at: now,
            updated_at: now,
        }
    }

    /// Title for display, falling back to a generic label
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Group Activity")
    }

    pub fn is_finalized(&self) -> bool {
        self.status == ActivityStatus::Finalized
    }
}

/// Trimmed copy of an optional string, `None` when blank
pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Activity lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    #[default]
    Planning,
    Planned,
    Finalized,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Planning => "planning",
            ActivityStatus::Planned => "planned",
            ActivityStatus::Finalized => "finalized",
        }
    }

    /// Whether the activity may move from this status to `next`.
    ///
    /// Re-generating a plan keeps an activity `planned`; nothing leaves
    /// `finalized`.
    pub fn can_transition_to(&self, next: ActivityStatus) -> bool {
        use ActivityStatus::*;
        matches!(
            (self, next),
            (Planning, Planning) | (Planning, Planned) | (Planned, Planned) | (Planned, Finalized)
        )
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "planning" => Ok(ActivityStatus::Planning),
            "planned" => Ok(ActivityStatus::Planned),
            "finalized" => Ok(ActivityStatus::Finalized),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A participant to add while creating an activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewParticipantInput {
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Organizer contact details captured at creation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizerInput {
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Input for creating an activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateActivityInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub proposed_date: Option<String>,
    #[serde(default)]
    pub time_window: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub location_address: Option<String>,
    /// Organizer, added as the first participant when present
    #[serde(default)]
    pub organizer: Option<OrganizerInput>,
    #[serde(default)]
    pub participants: Vec<NewParticipantInput>,
}

/// Partial update for an activity; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateActivityInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub proposed_date: Option<String>,
    #[serde(default)]
    pub time_window: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub location_address: Option<String>,
}

impl UpdateActivityInput {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.proposed_date.is_none()
            && self.time_window.is_none()
            && self.start_time.is_none()
            && self.location_address.is_none()
    }

    /// Apply the provided fields to an activity
    pub fn apply_to(&self, activity: &mut Activity) {
        if self.title.is_some() {
            activity.title = non_blank(&self.title);
        }
        if self.description.is_some() {
            activity.description = non_blank(&self.description);
        }
        if self.proposed_date.is_some() {
            activity.proposed_date = non_blank(&self.proposed_date);
        }
        if self.time_window.is_some() {
            activity.time_window = non_blank(&self.time_window);
        }
        if self.start_time.is_some() {
            activity.start_time = non_blank(&self.start_time);
        }
        if self.location_address.is_some() {
            activity.location_address = non_blank(&self.location_address);
        }
    }
}

/// Participant progress for an activity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ResponseStats {
    pub total: usize,
    /// Participants past `invited`
    pub responded: usize,
    pub completed: usize,
    /// Percentage of participants who responded
    pub response_rate: f64,
    /// Percentage of participants who completed
    pub completion_rate: f64,
}

impl ResponseStats {
    pub fn from_participants(participants: &[Participant]) -> Self {
        let total = participants.len();
        let responded = participants
            .iter()
            .filter(|p| p.status != ParticipantStatus::Invited)
            .count();
        let completed = participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Complete)
            .count();

        let rate = |n: usize| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64 * 100.0
            }
        };

        Self {
            total,
            responded,
            completed,
            response_rate: rate(responded),
            completion_rate: rate(completed),
        }
    }
}

/// Activity with everything a detail view needs
#[derive(Debug, Clone, Serialize)]
pub struct ActivityDetail {
    pub activity: Activity,
    pub participants: Vec<Participant>,
    pub stats: ResponseStats,
    pub latest_plan: Option<Plan>,
}
