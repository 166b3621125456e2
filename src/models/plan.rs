//! Plan model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UnknownStatus;

/// One line of a plan's tentative schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub time: String,
    pub activity: String,
}

impl ScheduleItem {
    pub fn new(time: &str, activity: &str) -> Self {
        Self {
            time: time.to_string(),
            activity: activity.to_string(),
        }
    }
}

/// Plan review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Draft,
    Revised,
    Final,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Revised => "revised",
            PlanStatus::Final => "final",
        }
    }

    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Draft, Revised) | (Draft, Final) | (Revised, Revised) | (Revised, Final)
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(PlanStatus::Draft),
            "revised" => Ok(PlanStatus::Revised),
            "final" => Ok(PlanStatus::Final),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Where a plan's content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    #[default]
    Heuristic,
    Assistant,
    /// Canned itinerary used when no language model is configured
    Fallback,
}

impl PlanSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanSource::Heuristic => "heuristic",
            PlanSource::Assistant => "assistant",
            PlanSource::Fallback => "fallback",
        }
    }
}

impl FromStr for PlanSource {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heuristic" => Ok(PlanSource::Heuristic),
            "assistant" => Ok(PlanSource::Assistant),
            "fallback" => Ok(PlanSource::Fallback),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Plan content before it is attached to an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub schedule: Vec<ScheduleItem>,
    #[serde(default)]
    pub considerations: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// Proposed calendar date, when the producer picked one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
}

/// A generated activity plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub activity_id: String,
    pub title: String,
    pub description: String,
    pub scheduled_date: Option<NaiveDate>,
    pub time_window: Option<String>,
    pub start_time: Option<String>,
    pub location_address: Option<String>,
    pub schedule: Vec<ScheduleItem>,
    pub considerations: Option<String>,
    pub alternatives: Vec<String>,
    pub status: PlanStatus,
    pub source: PlanSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Build a draft plan for an activity from generated content
    pub fn from_draft(activity: &super::Activity, draft: PlanDraft, source: PlanSource) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            activity_id: activity.id.clone(),
            title: draft.title,
            description: draft.description,
            scheduled_date: draft.scheduled_date,
            time_window: activity.time_window.clone(),
            start_time: activity.start_time.clone(),
            location_address: activity.location_address.clone(),
            schedule: draft.schedule,
            considerations: draft.considerations,
            alternatives: draft.alternatives,
            status: PlanStatus::Draft,
            source,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_final(&self) -> bool {
        self.status == PlanStatus::Final
    }
}
