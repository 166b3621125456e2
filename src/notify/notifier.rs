//! Invitation and plan notifications
//!
//! Sends go out concurrently. A failed send is logged and counted in the
//! `DeliveryReport`; it never fails the caller.

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use super::{EmailSender, NotifyError, SmsSender};
use crate::db::repositories::MessageRepository;
use crate::models::{Activity, Channel, Direction, Message, Participant, Plan};

/// Counts of one notification round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    /// Not attempted: no address, channel off or not configured
    pub skipped: usize,
}

impl DeliveryReport {
    fn merge(mut self, other: DeliveryReport) -> Self {
        self.sent += other.sent;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self
    }

    fn sent() -> Self {
        Self {
            sent: 1,
            ..Default::default()
        }
    }

    fn failed() -> Self {
        Self {
            failed: 1,
            ..Default::default()
        }
    }

    fn skipped() -> Self {
        Self {
            skipped: 1,
            ..Default::default()
        }
    }
}

/// Channels to use for an invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyChannels {
    pub sms: bool,
    pub email: bool,
}

impl Default for NotifyChannels {
    fn default() -> Self {
        Self {
            sms: true,
            email: true,
        }
    }
}

pub struct Notifier {
    sms: Arc<dyn SmsSender>,
    email: Arc<dyn EmailSender>,
    messages: Arc<dyn MessageRepository>,
    public_url: String,
}

impl Notifier {
    pub fn new(
        sms: Arc<dyn SmsSender>,
        email: Arc<dyn EmailSender>,
        messages: Arc<dyn MessageRepository>,
        public_url: &str,
    ) -> Self {
        Self {
            sms,
            email,
            messages,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Personal link for a participant
    pub fn participant_link(&self, activity_id: &str, participant_id: &str) -> String {
        format!(
            "{}/activity/{}?participant={}",
            self.public_url, activity_id, participant_id
        )
    }

    pub fn activity_link(&self, activity_id: &str) -> String {
        format!("{}/activity/{}", self.public_url, activity_id)
    }

    pub fn plan_link(&self, activity_id: &str) -> String {
        format!("{}/activity/{}/plan", self.public_url, activity_id)
    }

    /// Reply for texts arriving on the SMS webhook
    pub fn webhook_reply(&self) -> String {
        format!(
            "Thanks for your message! For the best experience, please use our web interface. Visit {} to continue planning your activity.",
            self.public_url
        )
    }

    async fn log_outgoing(
        &self,
        participant: &Participant,
        channel: Channel,
        content: &str,
        metadata: serde_json::Value,
    ) {
        let message = Message::new(
            &participant.activity_id,
            Some(&participant.id),
            Direction::Outgoing,
            channel,
            content,
        )
        .with_metadata(metadata);
        if let Err(e) = self.messages.create(&message).await {
            tracing::warn!("Failed to log outgoing {}: {}", channel, e);
        }
    }

    fn outcome<T>(
        result: &Result<T, NotifyError>,
        channel: Channel,
        participant: &Participant,
    ) -> DeliveryReport {
        match result {
            Ok(_) => DeliveryReport::sent(),
            Err(NotifyError::NotConfigured(_)) => DeliveryReport::skipped(),
            Err(e) => {
                tracing::error!(
                    "Failed to send {} to participant {}: {}",
                    channel,
                    participant.id,
                    e
                );
                DeliveryReport::failed()
            }
        }
    }

    async fn text(&self, participant: &Participant, body: &str, kind: &str) -> DeliveryReport {
        let result = self.sms.send(&participant.phone_number, body).await;
        if let Ok(receipt) = &result {
            self.log_outgoing(
                participant,
                Channel::Sms,
                body,
                json!({ "kind": kind, "to": participant.phone_number, "sid": receipt.sid }),
            )
            .await;
        }
        Self::outcome(&result, Channel::Sms, participant)
    }

    async fn mail(
        &self,
        participant: &Participant,
        subject: &str,
        body: &str,
        kind: &str,
    ) -> DeliveryReport {
        let Some(address) = participant.email.as_deref() else {
            return DeliveryReport::skipped();
        };
        let result = self.email.send(address, subject, body).await;
        if result.is_ok() {
            self.log_outgoing(
                participant,
                Channel::Email,
                body,
                json!({ "kind": kind, "to": address, "subject": subject }),
            )
            .await;
        }
        Self::outcome(&result, Channel::Email, participant)
    }

    /// Invite one participant with their personal link
    pub async fn invite(
        &self,
        participant: &Participant,
        organizer_name: Option<&str>,
        channels: NotifyChannels,
    ) -> DeliveryReport {
        let link = self.participant_link(&participant.activity_id, &participant.id);

        let sms = if channels.sms {
            let body = format!(
                "Help {} plan your group activity. \n\nClick here: {}",
                organizer_name.unwrap_or("us"),
                link
            );
            self.text(participant, &body, "invitation").await
        } else {
            DeliveryReport::skipped()
        };

        let email = if channels.email {
            let body = format!(
                "Hi {},\n\nHelp plan the perfect activity by sharing your preferences:\n\n{}\n\nThis link is unique to you. No need to create an account!",
                participant.greeting_name(),
                link
            );
            self.mail(participant, "Welcome to Group Activity Planner!", &body, "invitation")
                .await
        } else {
            DeliveryReport::skipped()
        };

        sms.merge(email)
    }

    /// Invite several participants concurrently
    pub async fn invite_all(
        &self,
        participants: &[Participant],
        organizer_name: Option<&str>,
        channels: NotifyChannels,
    ) -> DeliveryReport {
        let sends = participants
            .iter()
            .map(|p| self.invite(p, organizer_name, channels));
        let report = join_all(sends)
            .await
            .into_iter()
            .fold(DeliveryReport::default(), DeliveryReport::merge);
        tracing::info!(
            "Invitations: {} sent, {} failed, {} skipped",
            report.sent,
            report.failed,
            report.skipped
        );
        report
    }

    fn plan_email(&self, participant: &Participant, plan: &Plan) -> (String, String) {
        let mut subject = format!("Your Group Activity Plan: {}", plan.title);
        let intro = if plan.is_final() {
            subject = format!("FINAL: {}", subject);
            "The plan for your group activity is final."
        } else {
            "A plan for your group activity is ready for your review."
        };
        let body = format!(
            "Hi {},\n\n{}\n\n{}\n\n{}\n\nView the plan and provide feedback: {}",
            participant.greeting_name(),
            intro,
            plan.title,
            plan.description,
            self.plan_link(&plan.activity_id)
        );
        (subject, body)
    }

    /// Email a plan and text opted-in participants, all concurrently
    async fn broadcast<F>(
        &self,
        participants: &[Participant],
        plan: &Plan,
        sms_body: F,
        kind: &str,
    ) -> DeliveryReport
    where
        F: Fn(&Participant) -> String,
    {
        let sends = participants.iter().map(|participant| {
            let (subject, body) = self.plan_email(participant, plan);
            let text = sms_body(participant);
            async move {
                let email = self.mail(participant, &subject, &body, kind).await;
                let sms = if participant.allow_group_text {
                    self.text(participant, &text, kind).await
                } else {
                    DeliveryReport::skipped()
                };
                email.merge(sms)
            }
        });
        let report = join_all(sends)
            .await
            .into_iter()
            .fold(DeliveryReport::default(), DeliveryReport::merge);
        tracing::info!(
            "Plan {} notifications ({}): {} sent, {} failed, {} skipped",
            plan.id,
            kind,
            report.sent,
            report.failed,
            report.skipped
        );
        report
    }

    /// A new plan is ready
    pub async fn plan_ready(
        &self,
        activity: &Activity,
        plan: &Plan,
        participants: &[Participant],
    ) -> DeliveryReport {
        let text = format!(
            "Your group activity plan is ready! 📅\n\nActivity: {}\nClick here to view and provide feedback: {}",
            plan.title,
            self.plan_link(&activity.id)
        );
        self.broadcast(participants, plan, |_| text.clone(), "plan_ready").await
    }

    /// The plan was revised from feedback
    pub async fn plan_updated(
        &self,
        activity: &Activity,
        participants: &[Participant],
    ) -> DeliveryReport {
        let link = self.activity_link(&activity.id);
        let sends = participants.iter().map(|participant| {
            let link = link.clone();
            async move {
                let email = self
                    .mail(
                        participant,
                        "Group Activity Plan Updated",
                        &format!(
                            "The plan has been updated based on feedback. Please check the latest version.\n\nView details: {}",
                            link
                        ),
                        "plan_updated",
                    )
                    .await;
                let sms = if participant.allow_group_text {
                    self.text(
                        participant,
                        &format!(
                            "The group activity plan has been updated based on feedback. Check your email for details.\n\nView details: {}",
                            link
                        ),
                        "plan_updated",
                    )
                    .await
                } else {
                    DeliveryReport::skipped()
                };
                email.merge(sms)
            }
        });
        join_all(sends)
            .await
            .into_iter()
            .fold(DeliveryReport::default(), DeliveryReport::merge)
    }

    /// The plan is final
    pub async fn plan_finalized(
        &self,
        activity: &Activity,
        plan: &Plan,
        participants: &[Participant],
    ) -> DeliveryReport {
        let text = format!(
            "The group activity plan has been finalized! Check your email for all the details.\n\nView details: {}",
            self.activity_link(&activity.id)
        );
        self.broadcast(participants, plan, |_| text.clone(), "plan_finalized").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        ActivityRepository, ParticipantRepository, SqlxActivityRepository, SqlxMessageRepository,
        SqlxParticipantRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreateActivityInput, PlanDraft, PlanSource, PlanStatus};
    use crate::notify::mock::{RecordingEmail, RecordingSms};
    use crate::notify::DisabledSms;

    struct Fixture {
        activity: Activity,
        participants: Vec<Participant>,
        messages: Arc<dyn MessageRepository>,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let activity = SqlxActivityRepository::new(pool.clone())
            .create(&Activity::new(&CreateActivityInput {
                title: Some("Picnic".to_string()),
                ..Default::default()
            }))
            .await
            .unwrap();

        let participant_repo = SqlxParticipantRepository::new(pool.clone());
        let mut participants = Vec::new();
        for (phone, email, group_text) in [
            ("+15550000002", Some("sam@example.com"), true),
            ("+15550000003", None, false),
        ] {
            let mut p = Participant::new(
                &activity.id,
                phone.to_string(),
                email.map(str::to_string),
                Some("Sam".to_string()),
            );
            p.allow_group_text = group_text;
            participants.push(participant_repo.create(&p).await.unwrap());
        }

        Fixture {
            activity,
            participants,
            messages: SqlxMessageRepository::boxed(pool),
        }
    }

    fn plan(activity: &Activity, status: PlanStatus) -> Plan {
        let mut plan = Plan::from_draft(
            activity,
            PlanDraft {
                title: "Riverside Picnic".to_string(),
                description: "Lunch by the river".to_string(),
                schedule: Vec::new(),
                considerations: None,
                alternatives: Vec::new(),
                scheduled_date: None,
            },
            PlanSource::Heuristic,
        );
        plan.status = status;
        plan
    }

    #[tokio::test]
    async fn test_links() {
        let f = setup().await;
        let notifier = Notifier::new(
            Arc::new(DisabledSms),
            Arc::new(RecordingEmail::default()),
            f.messages,
            "https://plan.example.com/",
        );
        assert_eq!(
            notifier.participant_link("a1", "p1"),
            "https://plan.example.com/activity/a1?participant=p1"
        );
        assert_eq!(notifier.plan_link("a1"), "https://plan.example.com/activity/a1/plan");
        assert!(notifier.webhook_reply().contains("Visit https://plan.example.com to continue"));
    }

    #[tokio::test]
    async fn test_invite_all_sends_and_logs() {
        let f = setup().await;
        let sms = Arc::new(RecordingSms::default());
        let email = Arc::new(RecordingEmail::default());
        let notifier = Notifier::new(
            sms.clone(),
            email.clone(),
            f.messages.clone(),
            "https://plan.example.com",
        );

        let report = notifier
            .invite_all(&f.participants, Some("Alex"), NotifyChannels::default())
            .await;

        // 2 texts, 1 email, 1 participant without email
        assert_eq!(report, DeliveryReport { sent: 3, failed: 0, skipped: 1 });
        let texts = sms.sent();
        assert!(texts[0].1.starts_with("Help Alex plan your group activity."));
        assert!(texts
            .iter()
            .any(|(_, body)| body.contains(&format!("?participant={}", f.participants[1].id))));
        assert_eq!(email.sent()[0].1, "Welcome to Group Activity Planner!");

        let log = f.messages.list_by_activity(&f.activity.id).await.unwrap();
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|m| m.direction == Direction::Outgoing));
    }

    #[tokio::test]
    async fn test_invite_respects_channels_and_failures() {
        let f = setup().await;
        let sms = Arc::new(RecordingSms::failing_for(&["+15550000002"]));
        let email = Arc::new(RecordingEmail::default());
        let notifier = Notifier::new(
            sms.clone(),
            email.clone(),
            f.messages.clone(),
            "https://plan.example.com",
        );

        let report = notifier
            .invite(
                &f.participants[0],
                None,
                NotifyChannels {
                    sms: true,
                    email: false,
                },
            )
            .await;
        assert_eq!(report, DeliveryReport { sent: 0, failed: 1, skipped: 1 });
        assert!(email.sent().is_empty());
        assert!(f.messages.list_by_activity(&f.activity.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plan_ready_texts_only_opted_in() {
        let f = setup().await;
        let sms = Arc::new(RecordingSms::default());
        let email = Arc::new(RecordingEmail::default());
        let notifier =
            Notifier::new(sms.clone(), email.clone(), f.messages, "https://plan.example.com");

        let plan = plan(&f.activity, PlanStatus::Draft);
        let report = notifier.plan_ready(&f.activity, &plan, &f.participants).await;

        assert_eq!(report, DeliveryReport { sent: 2, failed: 0, skipped: 2 });
        let texts = sms.sent();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].0, "+15550000002");
        assert!(texts[0].1.contains("Activity: Riverside Picnic"));
        assert!(texts[0].1.ends_with(&format!("/activity/{}/plan", f.activity.id)));
        assert_eq!(email.sent()[0].1, "Your Group Activity Plan: Riverside Picnic");
    }

    #[tokio::test]
    async fn test_plan_finalized_subject() {
        let f = setup().await;
        let email = Arc::new(RecordingEmail::default());
        let notifier = Notifier::new(
            Arc::new(DisabledSms),
            email.clone(),
            f.messages,
            "https://plan.example.com",
        );

        let plan = plan(&f.activity, PlanStatus::Final);
        let report = notifier.plan_finalized(&f.activity, &plan, &f.participants).await;

        // Disabled SMS counts as skipped
        assert_eq!(report, DeliveryReport { sent: 1, failed: 0, skipped: 3 });
        assert_eq!(email.sent()[0].1, "FINAL: Your Group Activity Plan: Riverside Picnic");
    }

    #[tokio::test]
    async fn test_plan_updated() {
        let f = setup().await;
        let sms = Arc::new(RecordingSms::default());
        let email = Arc::new(RecordingEmail::default());
        let notifier =
            Notifier::new(sms.clone(), email.clone(), f.messages, "https://plan.example.com");

        let report = notifier.plan_updated(&f.activity, &f.participants).await;
        assert_eq!(report.sent, 2);
        assert_eq!(email.sent()[0].1, "Group Activity Plan Updated");
        assert!(sms.sent()[0].1.starts_with("The group activity plan has been updated"));
    }
}
