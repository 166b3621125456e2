//! Preference service
//!
//! Stores participant and group preferences and reshapes them for the API,
//! the planner and the assistant prompts.

use crate::db::repositories::{ParticipantRepository, PreferenceRepository};
use crate::models::{
    is_blank, to_category_map, ActivityPreferences, CategoryMap, FeedbackEntry, Preference,
    FEEDBACK_CATEGORY, GROUP_KEY, PLAN_FEEDBACK_KEY,
};
use anyhow::Context;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Display name for feedback left without a participant
pub const CREATOR_NAME: &str = "Activity Creator";

#[derive(Debug, thiserror::Error)]
pub enum PreferenceServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct PreferenceService {
    repo: Arc<dyn PreferenceRepository>,
    participants: Arc<dyn ParticipantRepository>,
}

impl PreferenceService {
    pub fn new(
        repo: Arc<dyn PreferenceRepository>,
        participants: Arc<dyn ParticipantRepository>,
    ) -> Self {
        Self { repo, participants }
    }

    /// Save (insert or replace) one preference
    pub async fn save(
        &self,
        activity_id: &str,
        participant_id: Option<&str>,
        category: &str,
        key: &str,
        value: Value,
    ) -> Result<Preference, PreferenceServiceError> {
        let category = category.trim();
        let key = key.trim();
        if category.is_empty() || key.is_empty() {
            return Err(PreferenceServiceError::ValidationError(
                "Preference category and key are required".to_string(),
            ));
        }

        let pref = Preference::new(activity_id, participant_id, category, key, value);
        Ok(self.repo.upsert(&pref).await?)
    }

    /// Save every non-blank value of a `{category: {key: value}}` map.
    /// Returns how many values were stored.
    pub async fn save_map(
        &self,
        activity_id: &str,
        participant_id: Option<&str>,
        map: &CategoryMap,
    ) -> Result<usize, PreferenceServiceError> {
        let mut saved = 0;
        for (category, values) in map {
            for (key, value) in values {
                if is_blank(value) {
                    continue;
                }
                self.save(activity_id, participant_id, category, key, value.clone())
                    .await?;
                saved += 1;
            }
        }
        Ok(saved)
    }

    /// `{category: {key: value}}` for one participant
    pub async fn for_participant(
        &self,
        participant_id: &str,
    ) -> Result<CategoryMap, PreferenceServiceError> {
        let rows = self
            .repo
            .list_by_participant(participant_id)
            .await
            .context("Failed to load participant preferences")?;
        Ok(to_category_map(&rows))
    }

    /// `{participant_id | "group": {category: {key: value}}}` for an activity
    pub async fn for_activity(
        &self,
        activity_id: &str,
    ) -> Result<ActivityPreferences, PreferenceServiceError> {
        let mut all = ActivityPreferences::new();
        for (owner, map) in self.grouped(activity_id).await? {
            all.insert(owner, map);
        }
        Ok(all)
    }

    /// Per-owner preference maps in the order owners first stored a value.
    /// The group-level owner is reported as `"group"`.
    pub async fn grouped(
        &self,
        activity_id: &str,
    ) -> Result<Vec<(String, CategoryMap)>, PreferenceServiceError> {
        let rows = self
            .repo
            .list_by_activity(activity_id)
            .await
            .context("Failed to load activity preferences")?;

        let mut order: Vec<String> = Vec::new();
        let mut by_owner: HashMap<String, Vec<Preference>> = HashMap::new();
        for row in rows {
            let owner = row
                .participant_id
                .clone()
                .unwrap_or_else(|| GROUP_KEY.to_string());
            if !by_owner.contains_key(&owner) {
                order.push(owner.clone());
            }
            by_owner.entry(owner).or_default().push(row);
        }

        Ok(order
            .into_iter()
            .map(|owner| {
                let map = to_category_map(by_owner.get(&owner).into_iter().flatten());
                (owner, map)
            })
            .collect())
    }

    /// Plan feedback with the name of whoever left it, oldest first
    pub async fn feedback_for_activity(
        &self,
        activity_id: &str,
    ) -> Result<Vec<FeedbackEntry>, PreferenceServiceError> {
        let rows = self
            .repo
            .list_by_key(activity_id, FEEDBACK_CATEGORY, PLAN_FEEDBACK_KEY)
            .await
            .context("Failed to load feedback")?;

        let names: HashMap<String, Option<String>> = self
            .participants
            .list_by_activity(activity_id)
            .await
            .context("Failed to load participants")?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let entries = rows
            .into_iter()
            .filter(|row| !is_blank(&row.value))
            .map(|row| {
                let feedback = match &row.value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let participant_name = row
                    .participant_id
                    .as_ref()
                    .and_then(|id| names.get(id).cloned().flatten())
                    .unwrap_or_else(|| CREATOR_NAME.to_string());
                FeedbackEntry {
                    id: row.id,
                    participant_id: row.participant_id,
                    participant_name,
                    feedback,
                    created_at: row.created_at,
                }
            })
            .collect();

        Ok(entries)
    }

    /// Remove a participant's preferences, optionally keeping one category
    pub async fn clear_participant(
        &self,
        participant_id: &str,
        keep_category: Option<&str>,
    ) -> Result<u64, PreferenceServiceError> {
        Ok(self
            .repo
            .delete_by_participant(participant_id, keep_category)
            .await
            .context("Failed to clear participant preferences")?)
    }

    /// Remove a single stored answer of a participant
    pub async fn remove(
        &self,
        participant_id: &str,
        category: &str,
        key: &str,
    ) -> Result<u64, PreferenceServiceError> {
        Ok(self
            .repo
            .delete_key(participant_id, category, key)
            .await
            .context("Failed to remove preference")?)
    }
}
