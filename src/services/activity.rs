//! Activity service
//!
//! Implements activity management:
//! - Create activities with organizer and initial participants
//! - Partial updates, rejected once the activity is finalized
//! - Detail view (participants, response stats, latest plan)
//! - Status transitions planning -> planned -> finalized

use crate::db::repositories::{ActivityRepository, PlanRepository};
use crate::models::{
    Activity, ActivityDetail, ActivityStatus, CreateActivityInput, Participant, ResponseStats,
    UpdateActivityInput,
};
use crate::services::participant::{ParticipantService, ParticipantServiceError};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Error types for activity service operations
#[derive(Debug, thiserror::Error)]
pub enum ActivityServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<ParticipantServiceError> for ActivityServiceError {
    fn from(err: ParticipantServiceError) -> Self {
        match err {
            ParticipantServiceError::NotFound(msg) => Self::NotFound(msg),
            ParticipantServiceError::ValidationError(msg) => Self::ValidationError(msg),
            ParticipantServiceError::InvalidTransition(msg) => Self::Conflict(msg),
            ParticipantServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Result of creating an activity
#[derive(Debug, Clone, Serialize)]
pub struct CreatedActivity {
    pub activity: Activity,
    /// Organizer participant, first in `participants` when present
    pub organizer: Option<Participant>,
    pub participants: Vec<Participant>,
}

impl CreatedActivity {
    /// Participants that should receive an invitation (everyone but the organizer)
    pub fn invitees(&self) -> impl Iterator<Item = &Participant> {
        let organizer_id = self.organizer.as_ref().map(|o| o.id.as_str());
        self.participants
            .iter()
            .filter(move |p| Some(p.id.as_str()) != organizer_id)
    }
}

pub struct ActivityService {
    repo: Arc<dyn ActivityRepository>,
    plans: Arc<dyn PlanRepository>,
    participants: Arc<ParticipantService>,
}

impl ActivityService {
    pub fn new(
        repo: Arc<dyn ActivityRepository>,
        plans: Arc<dyn PlanRepository>,
        participants: Arc<ParticipantService>,
    ) -> Self {
        Self {
            repo,
            plans,
            participants,
        }
    }

    /// Create an activity in `planning`.
    ///
    /// The organizer (when given) is added first, then every listed
    /// participant. Invitations are not sent here.
    pub async fn create(
        &self,
        input: CreateActivityInput,
    ) -> Result<CreatedActivity, ActivityServiceError> {
        let activity = Activity::new(&input);
        let activity = self
            .repo
            .create(&activity)
            .await
            .context("Failed to create activity")?;
        tracing::info!("Activity {} created", activity.id);

        let mut participants: Vec<Participant> =
            Vec::with_capacity(input.participants.len() + 1);
        let mut organizer = match &input.organizer {
            Some(org) => {
                let p = self
                    .participants
                    .add(
                        &activity.id,
                        &org.phone_number,
                        org.email.clone(),
                        org.name.clone(),
                    )
                    .await?;
                participants.push(p.clone());
                Some(p)
            }
            None => None,
        };

        for entry in &input.participants {
            let p = self
                .participants
                .add(
                    &activity.id,
                    &entry.phone_number,
                    entry.email.clone(),
                    entry.name.clone(),
                )
                .await?;
            // Duplicate phones collapse into the same participant; keep the merged row
            match participants.iter_mut().find(|existing| existing.id == p.id) {
                Some(existing) => {
                    if organizer.as_ref().is_some_and(|org| org.id == p.id) {
                        organizer = Some(p.clone());
                    }
                    *existing = p;
                }
                None => participants.push(p),
            }
        }

        Ok(CreatedActivity {
            activity,
            organizer,
            participants,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Activity, ActivityServiceError> {
        self.repo
            .get(id)
            .await
            .context("Failed to get activity")?
            .ok_or_else(|| ActivityServiceError::NotFound(format!("Activity {} not found", id)))
    }

    /// All activities, newest first
    pub async fn list(&self) -> Result<Vec<Activity>, ActivityServiceError> {
        Ok(self.repo.list().await.context("Failed to list activities")?)
    }

    pub async fn update(
        &self,
        id: &str,
        input: UpdateActivityInput,
    ) -> Result<Activity, ActivityServiceError> {
        let mut activity = self.get(id).await?;
        if activity.is_finalized() {
            return Err(ActivityServiceError::Conflict(format!(
                "Activity {} is finalized",
                id
            )));
        }
        if input.is_empty() {
            return Ok(activity);
        }

        input.apply_to(&mut activity);
        Ok(self
            .repo
            .update(&activity)
            .await
            .context("Failed to update activity")?)
    }

    /// Persist fields already set on the activity (used by the assistant flows)
    pub async fn save(&self, activity: &Activity) -> Result<Activity, ActivityServiceError> {
        Ok(self
            .repo
            .update(activity)
            .await
            .context("Failed to update activity")?)
    }

    /// Delete an activity together with everything that belongs to it
    pub async fn delete(&self, id: &str) -> Result<(), ActivityServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete activity")?;
        if !deleted {
            return Err(ActivityServiceError::NotFound(format!(
                "Activity {} not found",
                id
            )));
        }
        tracing::info!("Activity {} deleted", id);
        Ok(())
    }

    pub async fn detail(&self, id: &str) -> Result<ActivityDetail, ActivityServiceError> {
        let activity = self.get(id).await?;
        let participants = self.participants.list(id).await?;
        let stats = ResponseStats::from_participants(&participants);
        let latest_plan = self
            .plans
            .latest_for_activity(id)
            .await
            .context("Failed to get latest plan")?;

        Ok(ActivityDetail {
            activity,
            participants,
            stats,
            latest_plan,
        })
    }

    pub async fn stats(&self, id: &str) -> Result<ResponseStats, ActivityServiceError> {
        self.get(id).await?;
        let participants = self.participants.list(id).await?;
        Ok(ResponseStats::from_participants(&participants))
    }

    /// Move an activity to `next`, validating the transition
    pub async fn transition(
        &self,
        activity: &mut Activity,
        next: ActivityStatus,
    ) -> Result<(), ActivityServiceError> {
        if !activity.status.can_transition_to(next) {
            return Err(ActivityServiceError::Conflict(format!(
                "Activity cannot move from {} to {}",
                activity.status, next
            )));
        }
        if activity.status == next {
            return Ok(());
        }

        self.repo
            .update_status(&activity.id, next)
            .await
            .context("Failed to update activity status")?;
        tracing::info!("Activity {} status {} -> {}", activity.id, activity.status, next);
        activity.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxActivityRepository, SqlxParticipantRepository, SqlxPlanRepository,
        SqlxPreferenceRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{NewParticipantInput, OrganizerInput, ParticipantStatus};
    use crate::services::preference::PreferenceService;

    async fn setup() -> (ActivityService, Arc<PreferenceService>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let activities = SqlxActivityRepository::boxed(pool.clone());
        let participant_repo = SqlxParticipantRepository::boxed(pool.clone());
        let preferences = Arc::new(PreferenceService::new(
            SqlxPreferenceRepository::boxed(pool.clone()),
            participant_repo.clone(),
        ));
        let participants = Arc::new(ParticipantService::new(
            participant_repo,
            activities.clone(),
            preferences.clone(),
        ));
        let service =
            ActivityService::new(activities, SqlxPlanRepository::boxed(pool), participants);
        (service, preferences)
    }

    fn input() -> CreateActivityInput {
        CreateActivityInput {
            title: Some("Saturday outing".to_string()),
            location_address: Some("  Riverside Park ".to_string()),
            organizer: Some(OrganizerInput {
                phone_number: "5550000001".to_string(),
                email: Some("org@example.com".to_string()),
                name: Some("Alex".to_string()),
            }),
            participants: vec![
                NewParticipantInput {
                    phone_number: "5550000002".to_string(),
                    ..Default::default()
                },
                NewParticipantInput {
                    phone_number: "(555) 000-0002".to_string(),
                    name: Some("Blair".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_with_organizer_and_participants() {
        let (service, preferences) = setup().await;
        let created = service.create(input()).await.unwrap();

        assert_eq!(created.activity.status, ActivityStatus::Planning);
        assert_eq!(created.activity.location_address.as_deref(), Some("Riverside Park"));
        assert_eq!(created.participants.len(), 2);

        let organizer = created.organizer.clone().unwrap();
        assert_eq!(created.participants[0].id, organizer.id);
        assert_eq!(created.invitees().count(), 1);
        assert_eq!(created.participants[1].name.as_deref(), Some("Blair"));

        let contact = preferences.for_participant(&organizer.id).await.unwrap();
        assert_eq!(contact["contact"]["name"], "Alex");
    }

    #[tokio::test]
    async fn test_create_returns_merged_duplicates() {
        let (service, _) = setup().await;
        let created = service
            .create(CreateActivityInput {
                organizer: Some(OrganizerInput {
                    phone_number: "5550000001".to_string(),
                    email: None,
                    name: Some("Alex".to_string()),
                }),
                participants: vec![
                    NewParticipantInput {
                        phone_number: "+1 555 000 0001".to_string(),
                        email: Some("alex@example.com".to_string()),
                        ..Default::default()
                    },
                    NewParticipantInput {
                        phone_number: "5550000002".to_string(),
                        ..Default::default()
                    },
                    NewParticipantInput {
                        phone_number: "(555) 000-0002".to_string(),
                        email: Some("blair@example.com".to_string()),
                        name: Some("Blair".to_string()),
                    },
                ],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.participants.len(), 2);
        let organizer = created.organizer.clone().unwrap();
        assert_eq!(organizer.email.as_deref(), Some("alex@example.com"));
        assert_eq!(created.participants[0].email.as_deref(), Some("alex@example.com"));

        let invitee = created.invitees().next().unwrap();
        assert_eq!(invitee.email.as_deref(), Some("blair@example.com"));
        assert_eq!(invitee.name.as_deref(), Some("Blair"));
    }

    #[tokio::test]
    async fn test_create_persists_fields() {
        let (service, _) = setup().await;
        let created = service.create(input()).await.unwrap();
        let found = service.get(&created.activity.id).await.unwrap();
        assert_eq!(found.title.as_deref(), Some("Saturday outing"));
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (service, _) = setup().await;
        assert!(matches!(
            service.get("nope").await,
            Err(ActivityServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_rejected_when_finalized() {
        let (service, _) = setup().await;
        let mut activity = service.create(CreateActivityInput::default()).await.unwrap().activity;

        let updated = service
            .update(
                &activity.id,
                UpdateActivityInput {
                    start_time: Some("10:00".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.start_time.as_deref(), Some("10:00"));

        service.transition(&mut activity, ActivityStatus::Planned).await.unwrap();
        service.transition(&mut activity, ActivityStatus::Finalized).await.unwrap();
        let result = service
            .update(&activity.id, UpdateActivityInput::default())
            .await;
        assert!(matches!(result, Err(ActivityServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_transition_cannot_skip_planned() {
        let (service, _) = setup().await;
        let mut activity = service.create(CreateActivityInput::default()).await.unwrap().activity;
        let result = service.transition(&mut activity, ActivityStatus::Finalized).await;
        assert!(matches!(result, Err(ActivityServiceError::Conflict(_))));
        assert_eq!(activity.status, ActivityStatus::Planning);
    }

    #[tokio::test]
    async fn test_detail_and_stats() {
        let (service, _) = setup().await;
        let created = service.create(input()).await.unwrap();

        let detail = service.detail(&created.activity.id).await.unwrap();
        assert_eq!(detail.participants.len(), 2);
        assert!(detail.latest_plan.is_none());
        assert_eq!(detail.stats.total, 2);
        assert!(detail
            .participants
            .iter()
            .all(|p| p.status == ParticipantStatus::Invited));

        let stats = service.stats(&created.activity.id).await.unwrap();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.response_rate, 0.0);
    }

    #[tokio::test]
    async fn test_delete() {
        let (service, _) = setup().await;
        let id = service.create(input()).await.unwrap().activity.id;
        service.delete(&id).await.unwrap();
        assert!(matches!(
            service.delete(&id).await,
            Err(ActivityServiceError::NotFound(_))
        ));
    }
}
