//! Scripted questionnaire
//!
//! Five fixed batches of questions. A participant receives the first batch
//! they have not answered yet; answering the last one completes them.

use crate::models::{is_blank, CategoryMap, Participant, ParticipantStatus};
use crate::services::participant::{ParticipantService, ParticipantServiceError};
use crate::services::preference::PreferenceService;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Text,
    Email,
    Number,
    Boolean,
    Select,
    Multiselect,
    Textarea,
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: &'static str,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub question: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<&'static [&'static str]>,
    pub required: bool,
    pub category: &'static str,
}

impl Question {
    fn new(
        id: &'static str,
        kind: QuestionType,
        question: &'static str,
        required: bool,
    ) -> Self {
        Self {
            id,
            kind,
            question,
            options: None,
            required,
            category: category_for(id),
        }
    }

    fn with_options(mut self, options: &'static [&'static str]) -> Self {
        self.options = Some(options);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionBatch {
    /// Zero-based position in the questionnaire
    pub index: usize,
    pub title: &'static str,
    pub questions: Vec<Question>,
}

impl QuestionBatch {
    /// Every required question has a value and at least one question was
    /// answered at all
    pub fn is_answered(&self, prefs: &CategoryMap) -> bool {
        let stored = |q: &Question| prefs.get(q.category).and_then(|c| c.get(q.id));

        let required_done = self
            .questions
            .iter()
            .filter(|q| q.required)
            .all(|q| stored(q).is_some_and(|v| !is_blank(v)));
        let any_answered = self.questions.iter().any(|q| stored(q).is_some());

        required_done && any_answered
    }
}

static BATCHES: Lazy<Vec<QuestionBatch>> = Lazy::new(|| {
    use QuestionType::*;
    vec![
        QuestionBatch {
            index: 0,
            title: "About you",
            questions: vec![
                Question::new("email", Email, "What is your email address?", true),
                Question::new("name", Text, "What is your name?", true),
                Question::new(
                    "allow_group_text",
                    Boolean,
                    "Would you like to be included in a group text for this activity?",
                    true,
                ),
            ],
        },
        QuestionBatch {
            index: 1,
            title: "Your group",
            questions: vec![
                Question::new("group_size", Number, "How many people will be in your group?", true),
                Question::new(
                    "has_children",
                    Boolean,
                    "Will there be any children in your group?",
                    true,
                ),
                Question::new(
                    "has_seniors",
                    Boolean,
                    "Will there be any seniors or people with mobility concerns in your group?",
                    true,
                ),
            ],
        },
        QuestionBatch {
            index: 2,
            title: "Timing",
            questions: vec![
                Question::new(
                    "preferred_day",
                    Select,
                    "What day would you prefer for this activity?",
                    true,
                )
                .with_options(&["Weekday", "Weekend", "No preference"]),
                Question::new("preferred_time", Select, "What time of day do you prefer?", true)
                    .with_options(&["Morning", "Afternoon", "Evening", "No preference"]),
                Question::new(
                    "duration",
                    Select,
                    "How long would you like the activity to be?",
                    true,
                )
                .with_options(&["1-2 hours", "2-4 hours", "Half day", "Full day"]),
            ],
        },
        QuestionBatch {
            index: 3,
            title: "Activities",
            questions: vec![
                Question::new(
                    "activity_type",
                    Multiselect,
                    "What types of activities are you interested in?",
                    true,
                )
                .with_options(&[
                    "Outdoor",
                    "Indoor",
                    "Cultural",
                    "Educational",
                    "Relaxation",
                    "Food",
                    "Sports",
                ]),
                Question::new(
                    "walking_preference",
                    Select,
                    "How much walking are you comfortable with?",
                    true,
                )
                .with_options(&["Minimal", "Moderate", "Extensive"]),
                Question::new(
                    "budget_range",
                    Select,
                    "What is your budget range per person?",
                    true,
                )
                .with_options(&["$0-$25", "$25-$50", "$50-$100", "$100+"]),
            ],
        },
        QuestionBatch {
            index: 4,
            title: "Special requirements",
            questions: vec![
                Question::new(
                    "dietary_restrictions",
                    Text,
                    "Are there any dietary restrictions or preferences to consider?",
                    false,
                ),
                Question::new(
                    "accessibility_needs",
                    Text,
                    "Are there any accessibility requirements to consider?",
                    false,
                ),
                Question::new(
                    "additional_info",
                    Textarea,
                    "Is there anything else you would like to add?",
                    false,
                ),
            ],
        },
    ]
});

/// All question batches in order
pub fn batches() -> &'static [QuestionBatch] {
    &BATCHES
}

/// Preference category an answer to `question_id` is stored under
pub fn category_for(question_id: &str) -> &'static str {
    match question_id {
        "email" | "name" | "allow_group_text" => "contact",
        "group_size" | "has_children" | "has_seniors" | "social_level" => "group",
        "preferred_day" | "preferred_time" | "duration" => "timing",
        "activity_type" | "physical_exertion" | "walking_preference" | "budget_range"
        | "learning_preference" => "activity",
        "meals_included" => "meals",
        "dietary_restrictions" | "accessibility_needs" | "additional_info" | "direct_input" => {
            "requirements"
        }
        _ => "other",
    }
}

/// First batch not yet answered, `None` when the questionnaire is done
pub fn next_batch(prefs: &CategoryMap) -> Option<&'static QuestionBatch> {
    BATCHES.iter().find(|batch| !batch.is_answered(prefs))
}

/// Outcome of submitting a batch of answers
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub participant: Participant,
    pub next_batch: Option<QuestionBatch>,
    pub complete: bool,
}

/// Loose boolean reading for form-style answers
fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "on" => Some(true),
            "false" | "no" | "n" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct QuestionnaireService {
    participants: Arc<ParticipantService>,
    preferences: Arc<PreferenceService>,
}

impl QuestionnaireService {
    pub fn new(participants: Arc<ParticipantService>, preferences: Arc<PreferenceService>) -> Self {
        Self {
            participants,
            preferences,
        }
    }

    /// Next batch for a participant
    pub async fn next_for(
        &self,
        participant: &Participant,
    ) -> Result<Option<&'static QuestionBatch>, ParticipantServiceError> {
        let prefs = self.preferences.for_participant(&participant.id).await?;
        Ok(next_batch(&prefs))
    }

    /// Store a batch of answers and advance the participant
    pub async fn submit_answers(
        &self,
        mut participant: Participant,
        answers: BTreeMap<String, Value>,
    ) -> Result<SubmitOutcome, ParticipantServiceError> {
        if answers.is_empty() {
            return Err(ParticipantServiceError::ValidationError(
                "No answers provided".to_string(),
            ));
        }

        for (question_id, answer) in &answers {
            let category = category_for(question_id);
            tracing::debug!(
                "Saving answer {}.{} for participant {}",
                category,
                question_id,
                participant.id
            );
            self.preferences
                .save(
                    &participant.activity_id,
                    Some(&participant.id),
                    category,
                    question_id,
                    answer.clone(),
                )
                .await?;

            match question_id.as_str() {
                "email" => participant.email = as_text(answer).or(participant.email.take()),
                "name" => participant.name = as_text(answer).or(participant.name.take()),
                "allow_group_text" => {
                    if let Some(allow) = as_bool(answer) {
                        participant.allow_group_text = allow;
                    }
                }
                _ => {}
            }
        }

        let mut participant = self.participants.save(&participant).await?;
        if participant.status == ParticipantStatus::Invited {
            self.participants
                .transition(&mut participant, ParticipantStatus::Active)
                .await?;
        }

        let next = self.next_for(&participant).await?.cloned();
        let complete = next.is_none();
        if complete {
            self.participants
                .transition(&mut participant, ParticipantStatus::Complete)
                .await?;
            tracing::info!("Participant {} completed the questionnaire", participant.id);
        }

        Ok(SubmitOutcome {
            participant,
            next_batch: next,
            complete,
        })
    }
}
