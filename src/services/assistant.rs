//! Planning assistant
//!
//! Builds prompts for the organizer conversation, the participant chat and
//! plan drafting, and turns model replies into structured results. When no
//! model is configured, or a call fails, the keyword assistant answers.

use crate::llm::parse::{extract_json_object, humanize_key, prepare_history, strip_code_fence};
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::models::{Activity, CategoryMap, ChatTurn, PlanDraft, PlanSource, ScheduleItem};
use crate::services::keyword::KeywordAssistant;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

const CREATOR_SYSTEM_PROMPT: &str = r#"You are an activity planning assistant that helps an organizer plan a group activity.

Reply conversationally and refer to the specific details the organizer gave. Never ask for something they already told you and never answer with a generic greeting when they described their plans.

Information worth gathering:
1. Activity type (dinner, movie, hiking, museum visit, ...)
2. Group size and composition (adults, children, ages, relationships)
3. Location (departure point, destination, venues, indoor or outdoor)
4. Budget (per person or total)
5. Timing (date, time of day, duration)
6. Transportation
7. Special requirements (accessibility, dietary needs, interests)
8. Meals

Answer with JSON only, in this format:
{
    "message": "Your reply to the organizer",
    "extracted_info": {
        "activity_type": "Type of activity or null",
        "group_size": "Number of people or null",
        "group_composition": "Who is in the group or null",
        "location": "Location details or null",
        "budget": "Budget details or null",
        "timing": "Day, time or date details or null",
        "transportation": "Transportation details or null",
        "special_requirements": "Special requirements or null",
        "meals": "Meal arrangements or null",
        "duration": "How long the activity lasts or null"
    }
}"#;

const PARTICIPANT_SYSTEM_PROMPT: &str = r#"You are an activity planning assistant collecting one participant's preferences for a group activity.

Acknowledge the specific preferences they share and ask about what is still missing. Never answer with a generic greeting when they shared preferences.

Answer with JSON only, in this format:
{
    "message": "Your reply to the participant",
    "extracted_preferences": {
        "activity": {
            "activity_type": "Preferred type of activity or null",
            "physical_exertion": "low, moderate or high, or null",
            "budget_range": "Budget with amount if mentioned, or null",
            "learning_preference": "Learn something new or practice existing skills, or null"
        },
        "timing": {
            "preferred_day": "Specific days or weekday/weekend, or null",
            "preferred_time": "morning, afternoon or evening, or null",
            "duration": "How long the activity should be, or null",
            "specific_date": "A specific date, or null"
        },
        "meals": {
            "meals_included": "Whether meals should be included, or null",
            "dietary_restrictions": "Dietary restrictions, or null",
            "cuisine_preference": "Preferred cuisines, or null"
        },
        "group": {
            "has_children": "true/false or null",
            "has_seniors": "true/false or null",
            "group_size": "Preferred group size or null",
            "social_level": "How social the activity should be, or null"
        },
        "location": {
            "indoor_outdoor": "indoor or outdoor, or null",
            "specific_location": "A specific venue or place, or null",
            "distance": "How far they will travel, or null",
            "transportation": "Transportation needs, or null"
        },
        "requirements": {
            "accessibility_needs": "Accessibility requirements, or null",
            "special_interests": "Special interests, or null",
            "additional_info": "Anything else important, or null"
        }
    }
}"#;

const PLAN_SYSTEM_PROMPT: &str = r#"You are an activity planning assistant that writes a detailed plan for a group from every participant's preferences.

Pay attention to group composition (children, seniors, group size), activity preferences and exertion levels, location and transportation, budget, timing, meals and dietary restrictions, and accessibility needs.

Answer with JSON only, in this format:
{
    "title": "Descriptive title naming the main activity",
    "description": "Several paragraphs describing the plan, why it suits this group and how it accommodates their preferences",
    "schedule": [
        {"time": "9:00 AM", "activity": "What happens at this point"}
    ],
    "considerations": "Accessibility accommodations, weather backup plans and similar notes",
    "alternatives": ["Alternative activity 1", "Alternative activity 2"]
}"#;

/// Reply when the model failed and the keyword tables found nothing
pub const CREATOR_UNAVAILABLE: &str = "I'm currently unable to process your information through my language system, but I'm still here to help. Could you tell me a bit more about what kind of activity you're interested in planning?";

const PARTICIPANT_UNAVAILABLE: &str = "I appreciate you sharing your preferences. To create the best possible plan, could you tell me more about your favorite activities or any specific requirements you have?";

const PARTICIPANT_UNPARSEABLE: &str = "Thanks for sharing your preferences. Could you tell me more about what types of activities you enjoy most?";

/// Who produced a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Assistant,
    Fallback,
}

/// Activity details pulled from the organizer's messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInfo {
    #[serde(default, deserialize_with = "loose_string")]
    pub activity_type: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub group_size: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub group_composition: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub budget: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub timing: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub transportation: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub special_requirements: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub meals: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub duration: Option<String>,
}

impl ExtractedInfo {
    pub fn is_empty(&self) -> bool {
        *self == ExtractedInfo::default()
    }

    /// Copy the activity type, location and timing into empty activity
    /// fields. Returns whether anything changed.
    pub fn fill_activity(&self, activity: &mut Activity) -> bool {
        let mut changed = false;
        let pairs = [
            (&mut activity.title, &self.activity_type),
            (&mut activity.location_address, &self.location),
            (&mut activity.time_window, &self.timing),
        ];
        for (field, extracted) in pairs {
            if field.is_none() {
                if let Some(value) = extracted {
                    *field = Some(value.clone());
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Read any JSON scalar or list as text; null, blank and "null" become `None`
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_text))
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    };
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatorReply {
    pub message: String,
    pub extracted_info: ExtractedInfo,
    pub source: ReplySource,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantReply {
    pub message: String,
    pub extracted_preferences: CategoryMap,
    pub source: ReplySource,
}

/// `{category: {key: value}}` out of a model reply, dropping nulls and
/// anything that is not nested objects
fn preference_map(value: Option<&Value>) -> CategoryMap {
    let mut map = CategoryMap::new();
    let Some(Value::Object(categories)) = value else {
        return map;
    };
    for (category, entries) in categories {
        let Value::Object(entries) = entries else {
            continue;
        };
        let kept: std::collections::BTreeMap<String, Value> = entries
            .iter()
            .filter(|(_, v)| {
                !v.is_null() && v.as_str().map_or(true, |s| !s.eq_ignore_ascii_case("null"))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !kept.is_empty() {
            map.insert(category.clone(), kept);
        }
    }
    map
}

pub fn parse_creator_reply(text: &str) -> CreatorReply {
    let (message, extracted_info) = match extract_json_object(text) {
        Some(obj) => match obj.get("message").and_then(Value::as_str) {
            Some(message) => {
                let info = obj
                    .get("extracted_info")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                (message.to_string(), info)
            }
            None => {
                tracing::warn!("Assistant reply JSON has no message field");
                (strip_code_fence(text).to_string(), ExtractedInfo::default())
            }
        },
        None => (text.trim().to_string(), ExtractedInfo::default()),
    };

    CreatorReply {
        message,
        extracted_info,
        source: ReplySource::Assistant,
    }
}

pub fn parse_participant_reply(text: &str) -> ParticipantReply {
    let parsed = extract_json_object(text);
    let message = parsed
        .as_ref()
        .and_then(|obj| obj.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let extracted_preferences =
        preference_map(parsed.as_ref().and_then(|obj| obj.get("extracted_preferences")));

    if message.is_none() {
        tracing::warn!("Could not read participant reply from assistant");
    }

    ParticipantReply {
        message: message.unwrap_or_else(|| PARTICIPANT_UNPARSEABLE.to_string()),
        extracted_preferences,
        source: ReplySource::Assistant,
    }
}

/// Plan draft out of a model reply; `None` without a title and description
pub fn parse_plan_draft(text: &str) -> Option<PlanDraft> {
    let obj = extract_json_object(text)?;
    let title = obj.get("title").and_then(value_text)?;
    let description = obj.get("description").and_then(value_text)?;

    let schedule = obj
        .get("schedule")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let time = item.get("time").and_then(value_text)?;
                    let activity = item.get("activity").and_then(value_text)?;
                    Some(ScheduleItem { time, activity })
                })
                .collect()
        })
        .unwrap_or_default();

    let considerations = match obj.get("considerations") {
        Some(Value::Array(items)) => {
            let lines: Vec<String> = items.iter().filter_map(value_text).collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        Some(other) => value_text(other),
        None => None,
    };

    let alternatives = match obj.get("alternatives") {
        Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
        Some(other) => value_text(other).into_iter().collect(),
        None => Vec::new(),
    };

    Some(PlanDraft {
        title,
        description,
        schedule,
        considerations,
        alternatives,
        scheduled_date: None,
    })
}

/// User message listing every participant's preferences for plan drafting
pub fn plan_request_message(activity_id: &str, preferences: &[(String, CategoryMap)]) -> String {
    let mut message = format!(
        "I need to create an activity plan for a group with ID {}. Here are the collected preferences from all participants:\n\n",
        activity_id
    );
    for (owner, categories) in preferences {
        message.push_str(&format!("Participant {}:\n", owner));
        for (category, entries) in categories {
            message.push_str(&format!("- {}:\n", humanize_key(category)));
            for (key, value) in entries {
                let shown = value_text(value).unwrap_or_else(|| "none".to_string());
                message.push_str(&format!("  - {}: {}\n", humanize_key(key), shown));
            }
        }
        message.push('\n');
    }
    message.push_str(
        "Please generate a detailed activity plan that accommodates these preferences as best as possible.",
    );
    message
}

pub struct PlanningAssistant {
    llm: Option<Arc<dyn LlmClient>>,
    fallback: KeywordAssistant,
}

impl PlanningAssistant {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            llm,
            fallback: KeywordAssistant,
        }
    }

    /// Whether a language model is configured
    pub fn is_enabled(&self) -> bool {
        self.llm.is_some()
    }

    /// Reply to the organizer and extract activity details
    pub async fn creator_reply(&self, message: &str, history: &[ChatTurn]) -> CreatorReply {
        let Some(llm) = &self.llm else {
            return self.fallback.creator_reply(message);
        };

        let request =
            CompletionRequest::new(CREATOR_SYSTEM_PROMPT, prepare_history(history, message));
        match llm.complete(request).await {
            Ok(text) => parse_creator_reply(&text),
            Err(e) => {
                tracing::warn!("Assistant call failed, using keyword reply: {}", e);
                let mut reply = self.fallback.creator_reply(message);
                if reply.extracted_info.is_empty() {
                    reply.message = CREATOR_UNAVAILABLE.to_string();
                }
                reply
            }
        }
    }

    /// Reply to a participant and extract their preferences
    pub async fn participant_reply(
        &self,
        message: &str,
        history: &[ChatTurn],
        activity: &Activity,
    ) -> ParticipantReply {
        let Some(llm) = &self.llm else {
            return self.fallback.participant_reply(message);
        };

        let system = format!(
            "{}\n\nThis is for the following activity:\n{}\n{}",
            PARTICIPANT_SYSTEM_PROMPT,
            activity.display_title(),
            activity.description.as_deref().unwrap_or("")
        );
        let request = CompletionRequest::new(system, prepare_history(history, message));
        match llm.complete(request).await {
            Ok(text) => parse_participant_reply(&text),
            Err(e) => {
                tracing::warn!("Assistant call failed, using keyword reply: {}", e);
                let mut reply = self.fallback.participant_reply(message);
                if reply.extracted_preferences.is_empty() {
                    reply.message = PARTICIPANT_UNAVAILABLE.to_string();
                }
                reply
            }
        }
    }

    /// Draft a plan from every participant's preferences.
    ///
    /// Without a model the canned keyword itinerary is returned. A failed or
    /// unreadable model reply is an error so the caller can fall back to the
    /// heuristic planner.
    pub async fn draft_plan(
        &self,
        activity_id: &str,
        preferences: &[(String, CategoryMap)],
    ) -> Result<(PlanDraft, PlanSource), LlmError> {
        let Some(llm) = &self.llm else {
            return Ok((self.fallback.draft_plan(preferences), PlanSource::Fallback));
        };

        let message = plan_request_message(activity_id, preferences);
        let request = CompletionRequest::new(PLAN_SYSTEM_PROMPT, vec![ChatTurn::user(message)]);
        let text = llm.complete(request).await?;
        let draft = parse_plan_draft(&text).ok_or_else(|| {
            LlmError::InvalidResponse("plan reply has no title or description".to_string())
        })?;
        Ok((draft, PlanSource::Assistant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::ScriptedLlm;
    use crate::models::{ChatRole, CreateActivityInput};
    use serde_json::json;

    fn assistant(llm: ScriptedLlm) -> (PlanningAssistant, Arc<ScriptedLlm>) {
        let llm = Arc::new(llm);
        (PlanningAssistant::new(Some(llm.clone())), llm)
    }

    #[test]
    fn test_parse_creator_reply_json() {
        let reply = parse_creator_reply(
            r#"```json
{"message": "A picnic for 8 sounds lovely!", "extracted_info": {"activity_type": "Picnic", "group_size": 8, "budget": null}}
```"#,
        );
        assert_eq!(reply.message, "A picnic for 8 sounds lovely!");
        assert_eq!(reply.extracted_info.activity_type.as_deref(), Some("Picnic"));
        assert_eq!(reply.extracted_info.group_size.as_deref(), Some("8"));
        assert!(reply.extracted_info.budget.is_none());
        assert_eq!(reply.source, ReplySource::Assistant);
    }

    #[test]
    fn test_parse_creator_reply_without_message_uses_raw_text() {
        let reply = parse_creator_reply(r#"{"extracted_info": {"location": "Park"}}"#);
        assert_eq!(reply.message, r#"{"extracted_info": {"location": "Park"}}"#);
        assert!(reply.extracted_info.is_empty());
    }

    #[test]
    fn test_fill_activity_only_empty_fields() {
        let mut activity = Activity::new(&CreateActivityInput {
            title: Some("Beach Day".to_string()),
            ..Default::default()
        });
        let info = ExtractedInfo {
            activity_type: Some("Hiking".to_string()),
            location: Some("Riverside Park".to_string()),
            ..Default::default()
        };

        assert!(info.fill_activity(&mut activity));
        assert_eq!(activity.title.as_deref(), Some("Beach Day"));
        assert_eq!(activity.location_address.as_deref(), Some("Riverside Park"));
        assert!(activity.time_window.is_none());
        assert!(!info.fill_activity(&mut activity));
    }

    #[test]
    fn test_parse_creator_reply_plain_text() {
        let reply = parse_creator_reply("  Sounds fun! Where should we go?  ");
        assert_eq!(reply.message, "Sounds fun! Where should we go?");
        assert!(reply.extracted_info.is_empty());
    }

    #[test]
    fn test_parse_participant_reply_drops_nulls() {
        let reply = parse_participant_reply(
            &json!({
                "message": "Noted!",
                "extracted_preferences": {
                    "timing": {"preferred_day": "Saturday", "duration": null},
                    "meals": {"dietary_restrictions": "null"},
                    "bogus": "x"
                }
            })
            .to_string(),
        );
        assert_eq!(reply.message, "Noted!");
        assert_eq!(reply.extracted_preferences.len(), 1);
        assert_eq!(reply.extracted_preferences["timing"]["preferred_day"], json!("Saturday"));
    }

    #[test]
    fn test_parse_participant_reply_unreadable() {
        let reply = parse_participant_reply("I think you'd like bowling.");
        assert_eq!(reply.message, PARTICIPANT_UNPARSEABLE);
        assert!(reply.extracted_preferences.is_empty());
    }

    #[test]
    fn test_parse_plan_draft() {
        let draft = parse_plan_draft(
            &json!({
                "title": "Lakeside Picnic",
                "description": "A relaxed afternoon by the lake.",
                "schedule": [
                    {"time": "11:00 AM", "activity": "Meet at the pavilion"},
                    {"time": "noon"}
                ],
                "considerations": ["Bring sunscreen", "Shade available"],
                "alternatives": ["Bowling", {"name": "Museum"}]
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(draft.title, "Lakeside Picnic");
        assert_eq!(draft.schedule, vec![ScheduleItem::new("11:00 AM", "Meet at the pavilion")]);
        assert_eq!(draft.considerations.as_deref(), Some("Bring sunscreen\nShade available"));
        assert_eq!(draft.alternatives.len(), 2);

        assert!(parse_plan_draft(r#"{"title": "No description"}"#).is_none());
    }

    #[test]
    fn test_plan_request_message() {
        let prefs: Vec<(String, CategoryMap)> = vec![(
            "p1".to_string(),
            serde_json::from_value(json!({"timing": {"preferred_day": "Weekend"}, "activity": {"activity_type": ["Food", "Outdoor"]}}))
                .unwrap(),
        )];
        let message = plan_request_message("act-1", &prefs);
        assert!(
            message.starts_with("I need to create an activity plan for a group with ID act-1.")
        );
        assert!(
            message.contains("Participant p1:\n- Activity:\n  - Activity type: Food, Outdoor\n")
        );
        assert!(message.contains("- Timing:\n  - Preferred day: Weekend\n"));
        assert!(message.ends_with("as best as possible."));
    }

    #[tokio::test]
    async fn test_creator_reply_without_client_uses_keywords() {
        let assistant = PlanningAssistant::new(None);
        let reply = assistant.creator_reply("a hike with 5 people", &[]).await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert_eq!(reply.extracted_info.group_size.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_creator_reply_failure_with_nothing_detected() {
        let (assistant, _) = assistant(ScriptedLlm::failing());
        let reply = assistant.creator_reply("hmm", &[]).await;
        assert_eq!(reply.message, CREATOR_UNAVAILABLE);
        assert_eq!(reply.source, ReplySource::Fallback);
    }

    #[tokio::test]
    async fn test_creator_reply_sends_history() {
        let (assistant, llm) = assistant(ScriptedLlm::replying(r#"{"message": "Great!"}"#));
        let history = vec![
            ChatTurn::assistant("Hi!"),
            ChatTurn::user("Dinner?"),
            ChatTurn::assistant("Sure"),
        ];
        let reply = assistant.creator_reply("For 4 people", &history).await;
        assert_eq!(reply.message, "Great!");

        let sent = &llm.requests()[0];
        assert_eq!(sent.messages.len(), 3);
        assert_eq!(sent.messages[0].role, ChatRole::User);
        assert_eq!(sent.messages[2].content, "For 4 people");
    }

    #[tokio::test]
    async fn test_participant_reply_includes_activity_context() {
        let (assistant, llm) = assistant(ScriptedLlm::replying(
            r#"{"message": "ok", "extracted_preferences": {}}"#,
        ));
        let activity = Activity::new(&CreateActivityInput {
            title: Some("Team Day".to_string()),
            description: Some("Quarterly outing".to_string()),
            ..Default::default()
        });
        assistant.participant_reply("hi", &[], &activity).await;
        let system = &llm.requests()[0].system;
        assert!(
            system.ends_with("This is for the following activity:\nTeam Day\nQuarterly outing")
        );
    }

    #[tokio::test]
    async fn test_participant_reply_failure_keeps_keyword_preferences() {
        let (assistant, _) = assistant(ScriptedLlm::failing());
        let activity = Activity::new(&CreateActivityInput::default());
        let reply = assistant.participant_reply("weekend please", &[], &activity).await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert_eq!(reply.extracted_preferences["timing"]["preferred_day"], json!("Weekend"));

        let (assistant, _) = self::assistant(ScriptedLlm::failing());
        let reply = assistant.participant_reply("hmm", &[], &activity).await;
        assert_eq!(reply.message, PARTICIPANT_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_draft_plan_sources() {
        let offline = PlanningAssistant::new(None);
        let (_, source) = offline.draft_plan("a", &[]).await.unwrap();
        assert_eq!(source, PlanSource::Fallback);

        let (online, _) = assistant(ScriptedLlm::replying(
            r#"{"title": "Bowling Night", "description": "Lanes and pizza.", "schedule": [], "alternatives": []}"#,
        ));
        let (draft, source) = online.draft_plan("a", &[]).await.unwrap();
        assert_eq!(source, PlanSource::Assistant);
        assert_eq!(draft.title, "Bowling Night");

        let (broken, _) = assistant(ScriptedLlm::replying("no plan today"));
        assert!(broken.draft_plan("a", &[]).await.is_err());
    }
}
