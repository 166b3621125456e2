//! Plan service
//!
//! Implements plan generation and review:
//! - Heuristic plans from aggregated participant preferences
//! - Assistant-drafted plans with a heuristic fallback
//! - Quick plans straight from the organizer conversation
//! - Feedback revisions and finalization

use crate::db::repositories::PlanRepository;
use crate::models::{
    is_truthy, Activity, ActivityStatus, CategoryMap, Plan, PlanDraft, PlanSource, PlanStatus,
    ResponseStats, ScheduleItem, FEEDBACK_CATEGORY, GROUP_KEY, PLAN_FEEDBACK_KEY,
};
use crate::services::activity::{ActivityService, ActivityServiceError};
use crate::services::assistant::{ExtractedInfo, PlanningAssistant};
use crate::services::keyword;
use crate::services::participant::{ParticipantService, ParticipantServiceError};
use crate::services::preference::{PreferenceService, PreferenceServiceError};
use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_ACTIVITY_TYPE: &str = "Outdoor";
const DEFAULT_DURATION: &str = "2-4 hours";
const DEFAULT_DAY: &str = "Weekend";

/// Error types for plan service operations
#[derive(Debug, thiserror::Error)]
pub enum PlanServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<ActivityServiceError> for PlanServiceError {
    fn from(err: ActivityServiceError) -> Self {
        match err {
            ActivityServiceError::NotFound(msg) => Self::NotFound(msg),
            ActivityServiceError::ValidationError(msg) => Self::ValidationError(msg),
            ActivityServiceError::Conflict(msg) => Self::Conflict(msg),
            ActivityServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

impl From<ParticipantServiceError> for PlanServiceError {
    fn from(err: ParticipantServiceError) -> Self {
        ActivityServiceError::from(err).into()
    }
}

impl From<PreferenceServiceError> for PlanServiceError {
    fn from(err: PreferenceServiceError) -> Self {
        match err {
            PreferenceServiceError::ValidationError(msg) => Self::ValidationError(msg),
            PreferenceServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Most frequent value; ties go to the value seen first
pub fn most_common<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, n) in counts {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((value, n));
        }
    }
    best.map(|(value, _)| value)
}

/// Text values stored under `key` in any category; lists are flattened
fn values_for<'a>(prefs: &'a CategoryMap, key: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    for entries in prefs.values() {
        match entries.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => found.push(s.trim()),
            Some(Value::Array(items)) => found.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty()),
            ),
            _ => {}
        }
    }
    found
}

fn any_truthy(prefs: &CategoryMap, key: &str) -> bool {
    prefs
        .values()
        .filter_map(|entries| entries.get(key))
        .any(is_truthy)
}

/// Proposed date: the coming Saturday at least five days out for weekend
/// groups, otherwise three days out
pub fn proposed_date(day: &str, today: NaiveDate) -> NaiveDate {
    if day == DEFAULT_DAY {
        let date = today + Duration::days(5);
        let weekday = date.weekday().num_days_from_monday() as i64;
        if weekday < 5 {
            return date + Duration::days(5 - weekday);
        }
        date
    } else {
        today + Duration::days(3)
    }
}

/// Tentative schedule for a duration; unknown durations get the full day
pub fn schedule_for(duration: &str) -> Vec<ScheduleItem> {
    let items: &[(&str, &str)] = match duration {
        "1-2 hours" => &[
            ("10:00 AM", "Meet at the location"),
            ("10:15 AM", "Activity begins"),
            ("11:45 AM", "Activity concludes"),
        ],
        "2-4 hours" => &[
            ("10:00 AM", "Meet at the location"),
            ("10:30 AM", "Activity begins"),
            ("12:30 PM", "Lunch break"),
            ("1:30 PM", "Continue activity"),
            ("2:30 PM", "Activity concludes"),
        ],
        "Half day" => &[
            ("9:00 AM", "Meet at the location"),
            ("9:30 AM", "First activity begins"),
            ("11:30 AM", "Break"),
            ("12:00 PM", "Lunch"),
            ("1:30 PM", "Second activity begins"),
            ("3:00 PM", "Activities conclude"),
        ],
        _ => &[
            ("9:00 AM", "Meet at the location"),
            ("9:30 AM", "Morning activity begins"),
            ("11:30 AM", "Break"),
            ("12:00 PM", "Lunch"),
            ("1:30 PM", "Afternoon activity begins"),
            ("3:30 PM", "Break"),
            ("4:00 PM", "Final activity"),
            ("5:30 PM", "Activities conclude"),
        ],
    };
    items
        .iter()
        .map(|(time, activity)| ScheduleItem::new(time, activity))
        .collect()
}

/// Build a plan from participant preferences. Group-level rows are ignored.
pub fn generate_plan(preferences: &[(String, CategoryMap)], today: NaiveDate) -> PlanDraft {
    let participants: Vec<&CategoryMap> = preferences
        .iter()
        .filter(|(owner, _)| owner != GROUP_KEY)
        .map(|(_, prefs)| prefs)
        .collect();

    let activity_type = most_common(
        participants
            .iter()
            .flat_map(|prefs| values_for(prefs, "activity_type")),
    )
    .unwrap_or(DEFAULT_ACTIVITY_TYPE);
    let duration = most_common(participants.iter().flat_map(|prefs| values_for(prefs, "duration")))
        .unwrap_or(DEFAULT_DURATION);
    let day = most_common(
        participants
            .iter()
            .flat_map(|prefs| values_for(prefs, "preferred_day")),
    )
    .unwrap_or(DEFAULT_DAY);

    let title = match activity_type {
        "Outdoor" => format!("Park Visit - {} {} Event", day, duration),
        "Sports" => format!("Mini Golf - {} {} Event", day, duration),
        other => format!("Group {} Activity - {} Event", other, day),
    };

    let mut sentences = vec![format!(
        "A {} {} activity for your group on a {}.",
        duration,
        activity_type.to_lowercase(),
        day.to_lowercase()
    )];
    if participants.iter().any(|p| any_truthy(p, "has_children")) {
        sentences.push("This plan includes child-friendly options.".to_string());
    }
    if participants.iter().any(|p| any_truthy(p, "has_seniors")) {
        sentences.push(
            "The activity is accessible for seniors and those with mobility concerns.".to_string(),
        );
    }

    let date = proposed_date(day, today);
    let schedule = schedule_for(duration);

    let mut description = sentences.join(" ");
    description.push_str(&format!(
        "\n\nProposed Date: {}\n\nTentative Schedule:\n",
        date.format("%A, %B %d, %Y")
    ));
    for item in &schedule {
        description.push_str(&format!("{} - {}\n", item.time, item.activity));
    }

    PlanDraft {
        title,
        description,
        schedule,
        considerations: None,
        alternatives: Vec::new(),
        scheduled_date: Some(date),
    }
}

/// Preference map for what the organizer typed into the conversation
fn organizer_preferences(input: &str, info: &ExtractedInfo) -> CategoryMap {
    let detected = keyword::detect(input);
    let mut prefs = CategoryMap::new();

    if !detected.activity_types.is_empty() {
        prefs
            .entry("activity".to_string())
            .or_default()
            .insert("activity_type".to_string(), json!(detected.activity_types));
    }
    let timing = prefs.entry("timing".to_string()).or_default();
    if let Some(day) = detected.preferred_day {
        timing.insert("preferred_day".to_string(), json!(day));
    }
    if let Some(duration) = &info.duration {
        timing.insert("duration".to_string(), json!(duration));
    }
    let group = prefs.entry("group".to_string()).or_default();
    group.insert("has_children".to_string(), json!(detected.has_children));
    group.insert("has_seniors".to_string(), json!(detected.has_seniors));

    prefs
}

pub struct PlanService {
    plans: Arc<dyn PlanRepository>,
    activities: Arc<ActivityService>,
    participants: Arc<ParticipantService>,
    preferences: Arc<PreferenceService>,
    assistant: Arc<PlanningAssistant>,
}

impl PlanService {
    pub fn new(
        plans: Arc<dyn PlanRepository>,
        activities: Arc<ActivityService>,
        participants: Arc<ParticipantService>,
        preferences: Arc<PreferenceService>,
        assistant: Arc<PlanningAssistant>,
    ) -> Self {
        Self {
            plans,
            activities,
            participants,
            preferences,
            assistant,
        }
    }

    /// Generate a draft plan once at least one participant has completed
    /// the questionnaire. The assistant drafts it when asked; any failure
    /// falls back to the heuristic planner.
    pub async fn generate(
        &self,
        activity_id: &str,
        use_assistant: bool,
    ) -> Result<Plan, PlanServiceError> {
        let mut activity = self.activities.get(activity_id).await?;
        if activity.is_finalized() {
            return Err(PlanServiceError::Conflict(format!(
                "Activity {} is finalized",
                activity_id
            )));
        }

        let participants = self.participants.list(activity_id).await?;
        let stats = ResponseStats::from_participants(&participants);
        if stats.completed == 0 {
            return Err(PlanServiceError::NotReady(
                "No participant has completed their preferences yet".to_string(),
            ));
        }

        let preferences = self.preferences.grouped(activity_id).await?;
        let today = Utc::now().date_naive();
        let (draft, source) = if use_assistant {
            match self.assistant.draft_plan(activity_id, &preferences).await {
                Ok(drafted) => drafted,
                Err(e) => {
                    tracing::warn!("Assistant plan failed, using heuristic plan: {}", e);
                    (generate_plan(&preferences, today), PlanSource::Heuristic)
                }
            }
        } else {
            (generate_plan(&preferences, today), PlanSource::Heuristic)
        };

        self.store(&mut activity, draft, source).await
    }

    /// Plan for the organizer conversation: fills empty activity fields
    /// from `info` and plans from stored preferences plus the organizer's
    /// own input. No completed participants are needed.
    pub async fn generate_quick_plan(
        &self,
        activity: &mut Activity,
        input: &str,
        info: &ExtractedInfo,
    ) -> Result<Plan, PlanServiceError> {
        if activity.is_finalized() {
            return Err(PlanServiceError::Conflict(format!(
                "Activity {} is finalized",
                activity.id
            )));
        }
        if info.fill_activity(activity) {
            *activity = self.activities.save(activity).await?;
        }

        let mut preferences = self.preferences.grouped(&activity.id).await?;
        preferences.push(("organizer".to_string(), organizer_preferences(input, info)));
        let draft = generate_plan(&preferences, Utc::now().date_naive());

        self.store(activity, draft, PlanSource::Heuristic).await
    }

    async fn store(
        &self,
        activity: &mut Activity,
        draft: PlanDraft,
        source: PlanSource,
    ) -> Result<Plan, PlanServiceError> {
        let plan = Plan::from_draft(activity, draft, source);
        let plan = self
            .plans
            .create(&plan)
            .await
            .context("Failed to create plan")?;
        self.activities
            .transition(activity, ActivityStatus::Planned)
            .await?;
        tracing::info!(
            "Plan {} generated for activity {} ({})",
            plan.id,
            activity.id,
            plan.source.as_str()
        );
        Ok(plan)
    }

    pub async fn get_in_activity(
        &self,
        activity_id: &str,
        plan_id: &str,
    ) -> Result<Plan, PlanServiceError> {
        self.plans
            .get(plan_id)
            .await
            .context("Failed to get plan")?
            .filter(|p| p.activity_id == activity_id)
            .ok_or_else(|| {
                PlanServiceError::NotFound(format!(
                    "Plan {} not found in activity {}",
                    plan_id, activity_id
                ))
            })
    }

    /// Most recent plan of an activity
    pub async fn latest(&self, activity_id: &str) -> Result<Option<Plan>, PlanServiceError> {
        self.activities.get(activity_id).await?;
        Ok(self
            .plans
            .latest_for_activity(activity_id)
            .await
            .context("Failed to get latest plan")?)
    }

    /// Every plan of an activity, newest first
    pub async fn list(&self, activity_id: &str) -> Result<Vec<Plan>, PlanServiceError> {
        self.activities.get(activity_id).await?;
        Ok(self
            .plans
            .list_by_activity(activity_id)
            .await
            .context("Failed to list plans")?)
    }

    /// Append feedback to a plan and mark it revised. The feedback is also
    /// stored as a preference of whoever left it.
    pub async fn revise(
        &self,
        activity_id: &str,
        plan_id: &str,
        feedback: &str,
        participant_id: Option<&str>,
    ) -> Result<Plan, PlanServiceError> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(PlanServiceError::ValidationError(
                "Feedback must not be empty".to_string(),
            ));
        }

        let mut plan = self.get_in_activity(activity_id, plan_id).await?;
        if !plan.status.can_transition_to(PlanStatus::Revised) {
            return Err(PlanServiceError::Conflict(format!(
                "Plan {} is {} and cannot be revised",
                plan.id, plan.status
            )));
        }
        if let Some(pid) = participant_id {
            self.participants.get_in_activity(activity_id, pid).await?;
        }

        plan.description
            .push_str(&format!("\n\nRevisions based on feedback:\n{}", feedback));
        plan.status = PlanStatus::Revised;
        let plan = self
            .plans
            .update(&plan)
            .await
            .context("Failed to update plan")?;

        self.preferences
            .save(
                activity_id,
                participant_id,
                FEEDBACK_CATEGORY,
                PLAN_FEEDBACK_KEY,
                json!(feedback),
            )
            .await?;
        tracing::info!("Plan {} revised", plan.id);
        Ok(plan)
    }

    /// Mark a plan final and the activity finalized
    pub async fn finalize(
        &self,
        activity_id: &str,
        plan_id: &str,
    ) -> Result<(Plan, Activity), PlanServiceError> {
        let mut plan = self.get_in_activity(activity_id, plan_id).await?;
        if !plan.status.can_transition_to(PlanStatus::Final) {
            return Err(PlanServiceError::Conflict(format!(
                "Plan {} is already final",
                plan.id
            )));
        }

        let mut activity = self.activities.get(activity_id).await?;
        if !activity.status.can_transition_to(ActivityStatus::Finalized) {
            return Err(PlanServiceError::Conflict(format!(
                "Activity {} cannot be finalized from {}",
                activity.id, activity.status
            )));
        }

        // Plan first: a finalized activity can never be retried
        plan.status = PlanStatus::Final;
        let plan = self
            .plans
            .update(&plan)
            .await
            .context("Failed to update plan")?;
        self.activities
            .transition(&mut activity, ActivityStatus::Finalized)
            .await?;
        tracing::info!("Plan {} finalized for activity {}", plan.id, activity.id);
        Ok((plan, activity))
    }
}
