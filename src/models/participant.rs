//! Participant model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UnknownStatus;

/// Invited person who supplies preferences for an activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// UUID v4 identifier, also the personal link token
    pub id: String,
    pub activity_id: String,
    pub name: Option<String>,
    /// Normalized E.164 phone number
    pub phone_number: String,
    pub email: Option<String>,
    /// Whether plan broadcasts may be texted to this participant
    pub allow_group_text: bool,
    pub status: ParticipantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    /// Create a new invited participant
    pub fn new(
        activity_id: &str,
        phone_number: String,
        email: Option<String>,
        name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            activity_id: activity_id.to_string(),
            name,
            phone_number,
            email,
            allow_group_text: false,
            status: ParticipantStatus::Invited,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name for greetings, falling back to "there"
    pub fn greeting_name(&self) -> &str {
        self.name.as_deref().unwrap_or("there")
    }
}

/// Participant progress status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    #[default]
    Invited,
    Active,
    Complete,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Invited => "invited",
            ParticipantStatus::Active => "active",
            ParticipantStatus::Complete => "complete",
        }
    }

    /// Progress only moves forward, except that any status may be reset
    /// back to `invited`. `invited -> complete` covers a questionnaire
    /// finished in a single submission.
    pub fn can_transition_to(&self, next: ParticipantStatus) -> bool {
        use ParticipantStatus::*;
        match (self, next) {
            (_, Invited) => true,
            (Invited, Active) | (Invited, Complete) => true,
            (Active, Active) | (Active, Complete) => true,
            (Complete, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "invited" => Ok(ParticipantStatus::Invited),
            "active" => Ok(ParticipantStatus::Active),
            "complete" => Ok(ParticipantStatus::Complete),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Contact field update for a participant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateParticipantInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub allow_group_text: Option<bool>,
}
