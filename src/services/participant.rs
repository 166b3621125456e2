//! Participant service
//!
//! Adds participants to activities (deduplicated by normalized phone),
//! keeps their contact preferences in sync and drives status transitions.

use crate::db::repositories::{ActivityRepository, ParticipantRepository};
use crate::models::{
    non_blank, Participant, ParticipantStatus, UpdateParticipantInput, CONTACT_CATEGORY,
};
use crate::services::phone::normalize_phone_number;
use crate::services::preference::{PreferenceService, PreferenceServiceError};
use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ParticipantServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<PreferenceServiceError> for ParticipantServiceError {
    fn from(err: PreferenceServiceError) -> Self {
        match err {
            PreferenceServiceError::ValidationError(msg) => Self::ValidationError(msg),
            PreferenceServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

pub struct ParticipantService {
    repo: Arc<dyn ParticipantRepository>,
    activities: Arc<dyn ActivityRepository>,
    preferences: Arc<PreferenceService>,
}

impl ParticipantService {
    pub fn new(
        repo: Arc<dyn ParticipantRepository>,
        activities: Arc<dyn ActivityRepository>,
        preferences: Arc<PreferenceService>,
    ) -> Self {
        Self {
            repo,
            activities,
            preferences,
        }
    }

    /// Add a participant to an activity.
    ///
    /// A participant with the same normalized phone in the same activity is
    /// reused, with missing email/name filled in from the input.
    pub async fn add(
        &self,
        activity_id: &str,
        phone_number: &str,
        email: Option<String>,
        name: Option<String>,
    ) -> Result<Participant, ParticipantServiceError> {
        let phone = normalize_phone_number(phone_number).ok_or_else(|| {
            ParticipantServiceError::ValidationError(format!(
                "Invalid phone number: '{}'",
                phone_number
            ))
        })?;
        let email = non_blank(&email);
        let name = non_blank(&name);

        self.activities
            .get(activity_id)
            .await
            .context("Failed to get activity")?
            .ok_or_else(|| {
                ParticipantServiceError::NotFound(format!("Activity {} not found", activity_id))
            })?;

        let existing = self
            .repo
            .find_by_phone(activity_id, &phone)
            .await
            .context("Failed to look up participant")?;

        let participant = match existing {
            Some(mut found) => {
                let mut changed = false;
                if found.email.is_none() && email.is_some() {
                    found.email = email;
                    changed = true;
                }
                if found.name.is_none() && name.is_some() {
                    found.name = name;
                    changed = true;
                }
                if changed {
                    found = self
                        .repo
                        .update(&found)
                        .await
                        .context("Failed to update participant")?;
                }
                found
            }
            None => {
                let participant = Participant::new(activity_id, phone, email, name);
                let created = self
                    .repo
                    .create(&participant)
                    .await
                    .context("Failed to create participant")?;
                tracing::info!(
                    "Participant {} added to activity {}",
                    created.id,
                    activity_id
                );
                created
            }
        };

        self.save_contact(&participant).await?;
        Ok(participant)
    }

    /// Update contact fields; blank strings clear name/email
    pub async fn update(
        &self,
        activity_id: &str,
        participant_id: &str,
        input: UpdateParticipantInput,
    ) -> Result<Participant, ParticipantServiceError> {
        let mut participant = self.get_in_activity(activity_id, participant_id).await?;

        if let Some(raw) = &input.phone_number {
            participant.phone_number = normalize_phone_number(raw).ok_or_else(|| {
                ParticipantServiceError::ValidationError(format!("Invalid phone number: '{}'", raw))
            })?;
        }
        if input.name.is_some() {
            participant.name = non_blank(&input.name);
        }
        if input.email.is_some() {
            participant.email = non_blank(&input.email);
        }
        if let Some(allow) = input.allow_group_text {
            participant.allow_group_text = allow;
        }

        let updated = self
            .repo
            .update(&participant)
            .await
            .context("Failed to update participant")?;
        self.save_contact(&updated).await?;
        Ok(updated)
    }

    pub async fn get(&self, participant_id: &str) -> Result<Participant, ParticipantServiceError> {
        self.repo
            .get(participant_id)
            .await
            .context("Failed to get participant")?
            .ok_or_else(|| {
                ParticipantServiceError::NotFound(format!(
                    "Participant {} not found",
                    participant_id
                ))
            })
    }

    /// Get a participant, treating one from another activity as missing
    pub async fn get_in_activity(
        &self,
        activity_id: &str,
        participant_id: &str,
    ) -> Result<Participant, ParticipantServiceError> {
        let participant = self.get(participant_id).await?;
        if participant.activity_id != activity_id {
            return Err(ParticipantServiceError::NotFound(format!(
                "Participant {} not found in activity {}",
                participant_id, activity_id
            )));
        }
        Ok(participant)
    }

    pub async fn list(
        &self,
        activity_id: &str,
    ) -> Result<Vec<Participant>, ParticipantServiceError> {
        Ok(self
            .repo
            .list_by_activity(activity_id)
            .await
            .context("Failed to list participants")?)
    }

    /// Participants that have not responded yet
    pub async fn list_invited(
        &self,
        activity_id: &str,
    ) -> Result<Vec<Participant>, ParticipantServiceError> {
        Ok(self
            .repo
            .list_by_status(activity_id, ParticipantStatus::Invited)
            .await
            .context("Failed to list invited participants")?)
    }

    /// Most recent participant with this phone across all activities
    pub async fn find_latest_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Participant>, ParticipantServiceError> {
        let Some(phone) = normalize_phone_number(phone_number) else {
            return Ok(None);
        };
        Ok(self
            .repo
            .find_latest_by_phone(&phone)
            .await
            .context("Failed to look up participant by phone")?)
    }

    /// Move a participant to `next`. Staying in the same status is a no-op.
    pub async fn transition(
        &self,
        participant: &mut Participant,
        next: ParticipantStatus,
    ) -> Result<(), ParticipantServiceError> {
        if participant.status == next {
            return Ok(());
        }
        if !participant.status.can_transition_to(next) {
            return Err(ParticipantServiceError::InvalidTransition(format!(
                "{} -> {}",
                participant.status, next
            )));
        }

        self.repo
            .update_status(&participant.id, next)
            .await
            .context("Failed to update participant status")?;
        tracing::debug!(
            "Participant {} status {} -> {}",
            participant.id,
            participant.status,
            next
        );
        participant.status = next;
        Ok(())
    }

    /// Persist name/email/allow_group_text changes from a questionnaire or chat
    pub async fn save(
        &self,
        participant: &Participant,
    ) -> Result<Participant, ParticipantServiceError> {
        let updated = self
            .repo
            .update(participant)
            .await
            .context("Failed to update participant")?;
        self.save_contact(&updated).await?;
        Ok(updated)
    }

    /// Drop every collected preference except contact details and send the
    /// participant back to `invited`
    pub async fn reset_progress(
        &self,
        activity_id: &str,
        participant_id: &str,
    ) -> Result<Participant, ParticipantServiceError> {
        let mut participant = self.get_in_activity(activity_id, participant_id).await?;

        let removed = self
            .preferences
            .clear_participant(&participant.id, Some(CONTACT_CATEGORY))
            .await?;
        self.save_contact(&participant).await?;
        self.transition(&mut participant, ParticipantStatus::Invited)
            .await?;

        tracing::info!(
            "Reset progress of participant {} ({} preferences removed)",
            participant.id,
            removed
        );
        Ok(participant)
    }

    async fn save_contact(&self, participant: &Participant) -> Result<(), ParticipantServiceError> {
        let pid = Some(participant.id.as_str());
        let activity_id = participant.activity_id.as_str();

        self.preferences
            .save(
                activity_id,
                pid,
                CONTACT_CATEGORY,
                "phone_number",
                Value::String(participant.phone_number.clone()),
            )
            .await?;
        // Cleared fields must not linger as answered contact questions
        for (key, value) in [("name", &participant.name), ("email", &participant.email)] {
            match value {
                Some(value) => {
                    let value = Value::String(value.clone());
                    self.preferences
                        .save(activity_id, pid, CONTACT_CATEGORY, key, value)
                        .await?;
                }
                None => {
                    self.preferences
                        .remove(&participant.id, CONTACT_CATEGORY, key)
                        .await?;
                }
            }
        }
        Ok(())
    }
}
