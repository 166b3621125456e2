//! Keyword-matching assistant
//!
//! Local replies used when no language model is configured or a model call
//! fails. Detection is plain word matching over the message text.

use crate::models::{is_truthy, CategoryMap, PlanDraft, ScheduleItem};
use crate::services::assistant::{CreatorReply, ExtractedInfo, ParticipantReply, ReplySource};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

const CREATOR_DEFAULT: &str = "Thanks for sharing your ideas! To help create the perfect activity plan, could you tell me more about your group size, general location, and any specific activities they might enjoy?";

const OUTDOOR_REPLY: &str = "An outdoor activity sounds perfect! I'd love to help you plan something that everyone can enjoy. Could you share more about how many people will be participating and if there are any specific outdoor activities your group prefers?";

const PARTICIPANT_DEFAULT: &str = "Thank you for sharing your preferences. This helps us plan an activity that everyone will enjoy. Is there anything specific you're looking forward to in this group activity?";

fn word_pattern(words: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{})\b", words)).expect("valid keyword pattern")
}

/// Activity types in questionnaire order with the words that suggest them
static ACTIVITY_TYPES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("Outdoor", word_pattern(r"outdoors?|hik(?:e|es|ing)|parks?|picnics?|trails?|camping")),
        ("Indoor", word_pattern(r"movies?|escape rooms?|board games?|arcade|indoors?")),
        (
            "Cultural",
            word_pattern(r"museums?|galler(?:y|ies)|history|historic|theat(?:er|re)|concerts?"),
        ),
        ("Educational", word_pattern(r"class(?:es)?|learn(?:ing)?|workshops?|lectures?")),
        ("Relaxation", word_pattern(r"spa|relax(?:ing)?|beach(?:es)?|yoga")),
        ("Food", word_pattern(r"food|dinner|lunch|brunch|restaurants?|cooking")),
        ("Sports", word_pattern(r"sports?|bowling|golf|mini golf|tennis|soccer|basketball")),
    ]
});

static WEEKEND: Lazy<Regex> = Lazy::new(|| word_pattern(r"weekends?|saturdays?|sundays?"));
static WEEKDAY: Lazy<Regex> =
    Lazy::new(|| word_pattern(r"weekdays?|mondays?|tuesdays?|wednesdays?|thursdays?|fridays?"));
static MORNING: Lazy<Regex> = Lazy::new(|| word_pattern(r"mornings?|breakfast"));
static AFTERNOON: Lazy<Regex> = Lazy::new(|| word_pattern(r"afternoons?"));
static EVENING: Lazy<Regex> = Lazy::new(|| word_pattern(r"evenings?|nights?|tonight"));
static CHILDREN: Lazy<Regex> = Lazy::new(|| word_pattern(r"kids?|child|children|toddlers?"));
static SENIORS: Lazy<Regex> = Lazy::new(|| {
    word_pattern(r"seniors?|elderly|grand(?:parents?|ma|pa|mother|father)|wheelchairs?|mobility")
});
static GROUP_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:group of\s+(\d{1,3})",
        r"|(\d{1,3})\s+(?:people|persons|guests|adults|friends|of us))\b"
    ))
    .expect("valid group size pattern")
});

/// Everything the keyword tables found in one message
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Detected {
    pub activity_types: Vec<&'static str>,
    pub preferred_day: Option<&'static str>,
    pub preferred_time: Option<&'static str>,
    pub has_children: bool,
    pub has_seniors: bool,
    pub group_size: Option<u32>,
}

impl Detected {
    pub fn is_empty(&self) -> bool {
        *self == Detected::default()
    }
}

/// Run every keyword table over `text`
pub fn detect(text: &str) -> Detected {
    let activity_types = ACTIVITY_TYPES
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(name, _)| *name)
        .collect();

    let preferred_day = if WEEKEND.is_match(text) {
        Some("Weekend")
    } else if WEEKDAY.is_match(text) {
        Some("Weekday")
    } else {
        None
    };

    let preferred_time = if MORNING.is_match(text) {
        Some("Morning")
    } else if AFTERNOON.is_match(text) {
        Some("Afternoon")
    } else if EVENING.is_match(text) {
        Some("Evening")
    } else {
        None
    };

    let group_size = GROUP_SIZE.captures(text).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
    });

    Detected {
        activity_types,
        preferred_day,
        preferred_time,
        has_children: CHILDREN.is_match(text),
        has_seniors: SENIORS.is_match(text),
        group_size,
    }
}

/// Local stand-in for the language model
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAssistant;

impl KeywordAssistant {
    pub fn creator_reply(&self, message: &str) -> CreatorReply {
        let found = detect(message);

        let mut composition = Vec::new();
        if found.has_children {
            composition.push("includes children");
        }
        if found.has_seniors {
            composition.push("includes seniors or people with mobility concerns");
        }
        let timing = match (found.preferred_day, found.preferred_time) {
            (Some(day), Some(time)) => Some(format!("{} {}", day, time.to_lowercase())),
            (Some(day), None) => Some(day.to_string()),
            (None, Some(time)) => Some(time.to_string()),
            (None, None) => None,
        };

        let extracted_info = ExtractedInfo {
            activity_type: (!found.activity_types.is_empty())
                .then(|| found.activity_types.join(", ")),
            group_size: found.group_size.map(|n| n.to_string()),
            group_composition: (!composition.is_empty()).then(|| composition.join(", ")),
            timing,
            ..Default::default()
        };

        let message = match found.activity_types.first() {
            Some(&"Outdoor") => OUTDOOR_REPLY.to_string(),
            Some(kind) => {
                let article = if kind.starts_with(['A', 'E', 'I', 'O', 'U']) {
                    "An"
                } else {
                    "A"
                };
                format!(
                    "{} {} activity sounds great! Could you share how many people will be joining, when you'd like to go, and roughly where?",
                    article,
                    kind.to_lowercase()
                )
            }
            None if !found.is_empty() => {
                "Thanks, that helps! What kind of activity is your group interested in?".to_string()
            }
            None => CREATOR_DEFAULT.to_string(),
        };

        CreatorReply {
            message,
            extracted_info,
            source: ReplySource::Fallback,
        }
    }

    pub fn participant_reply(&self, message: &str) -> ParticipantReply {
        let found = detect(message);
        let mut prefs = CategoryMap::new();
        let mut put = |category: &str, key: &str, value: Value| {
            prefs
                .entry(category.to_string())
                .or_default()
                .insert(key.to_string(), value);
        };

        if !found.activity_types.is_empty() {
            put("activity", "activity_type", json!(found.activity_types));
        }
        if found.activity_types.contains(&"Outdoor") {
            put("location", "indoor_outdoor", json!("outdoor"));
        }
        if let Some(day) = found.preferred_day {
            put("timing", "preferred_day", json!(day));
        }
        if let Some(time) = found.preferred_time {
            put("timing", "preferred_time", json!(time));
        }
        if found.has_children {
            put("group", "has_children", json!(true));
        }
        if found.has_seniors {
            put("group", "has_seniors", json!(true));
        }
        if let Some(size) = found.group_size {
            put("group", "group_size", json!(size));
        }

        let message = if found.activity_types.contains(&"Outdoor") {
            "I see you enjoy outdoor activities! That's great to know. Is there a particular type of outdoor activity you prefer, like hiking, parks, or water activities?"
        } else if found.preferred_day == Some("Weekend") {
            "Weekend activities work well for you - noted! Do you have a preference for morning, afternoon, or evening activities on the weekend?"
        } else if !found.is_empty() {
            "Thanks, I've noted that. Is there anything else the planner should know, like your budget or how long you'd like the activity to be?"
        } else {
            PARTICIPANT_DEFAULT
        };

        ParticipantReply {
            message: message.to_string(),
            extracted_preferences: prefs,
            source: ReplySource::Fallback,
        }
    }

    /// Canned itinerary shaped by the group's most requested activity type
    /// and whether anyone mentioned children or seniors
    pub fn draft_plan(&self, preferences: &[(String, CategoryMap)]) -> PlanDraft {
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut children = false;
        let mut seniors = false;

        for (_, categories) in preferences {
            if let Some(kind) = categories.get("activity").and_then(|a| a.get("activity_type")) {
                let kinds: Vec<String> = match kind {
                    Value::Array(items) => items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    Value::String(s) => vec![s.clone()],
                    _ => Vec::new(),
                };
                for kind in kinds {
                    match counts.iter_mut().find(|(k, _)| *k == kind) {
                        Some((_, n)) => *n += 1,
                        None => counts.push((kind, 1)),
                    }
                }
            }
            if let Some(group) = categories.get("group") {
                children |= group.get("has_children").is_some_and(is_truthy);
                seniors |= group.get("has_seniors").is_some_and(is_truthy);
            }
        }

        let mut best: Option<(String, usize)> = None;
        for (kind, n) in counts {
            if best.as_ref().map_or(true, |(_, top)| n > *top) {
                best = Some((kind, n));
            }
        }
        let kind = best.map(|(k, _)| k).unwrap_or_else(|| "Outdoor".to_string());

        let mut considerations = vec![
            "Confirm the venue's opening hours and booking requirements a few days ahead.".to_string(),
            "Share a meeting point and a contact number with everyone.".to_string(),
        ];
        if children {
            considerations.push(
                "Pick venues with child-friendly facilities and plan short breaks.".to_string(),
            );
        }
        if seniors {
            considerations.push(
                "Check step-free access and seating for people with mobility concerns.".to_string(),
            );
        }

        let alternatives: Vec<String> = ["Food", "Cultural", "Outdoor"]
            .iter()
            .filter(|alt| **alt != kind)
            .take(2)
            .map(|alt| format!("A {} outing with the same group and timing", alt.to_lowercase()))
            .collect();

        PlanDraft {
            title: format!("Group {} Outing", kind),
            description: format!(
                "A relaxed {} outing for the whole group. Everyone meets at a central spot, spends the main part of the day on the activity, and finishes with a shared meal nearby.",
                kind.to_lowercase()
            ),
            schedule: vec![
                ScheduleItem::new("10:00 AM", "Meet at the agreed meeting point"),
                ScheduleItem::new("10:30 AM", "Main activity begins"),
                ScheduleItem::new("12:30 PM", "Lunch together nearby"),
                ScheduleItem::new("2:00 PM", "Free time and wrap-up"),
            ],
            considerations: Some(considerations.join(" ")),
            alternatives,
            scheduled_date: None,
        }
    }
}
