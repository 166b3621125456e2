//! Preference model
//!
//! Preferences are `(category, key) -> value` rows owned by an activity and,
//! optionally, a participant. Rows without a participant are group-level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Contact category, preserved by a progress reset
pub const CONTACT_CATEGORY: &str = "contact";

/// Category used for plan feedback rows
pub const FEEDBACK_CATEGORY: &str = "feedback";

/// Key used for plan feedback rows
pub const PLAN_FEEDBACK_KEY: &str = "plan_feedback";

/// Key under which group-level preferences are reported
pub const GROUP_KEY: &str = "group";

/// A stored preference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub id: String,
    pub activity_id: String,
    pub participant_id: Option<String>,
    pub category: String,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
}

impl Preference {
    pub fn new(
        activity_id: &str,
        participant_id: Option<&str>,
        category: &str,
        key: &str,
        value: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            activity_id: activity_id.to_string(),
            participant_id: participant_id.map(str::to_string),
            category: category.to_string(),
            key: key.to_string(),
            value,
            created_at: Utc::now(),
        }
    }
}

/// `{category: {key: value}}`
pub type CategoryMap = BTreeMap<String, BTreeMap<String, Value>>;

/// `{participant_id | "group": {category: {key: value}}}`
pub type ActivityPreferences = BTreeMap<String, CategoryMap>;

/// Encode a value for storage. Every value is stored as JSON text.
pub fn encode_value(value: &Value) -> String {
    value.to_string()
}

/// Decode stored text. Legacy rows holding plain text read back as a string.
pub fn decode_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Whether a value counts as an answer
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Yes/no answer read loosely: `true`, "true", "yes" or a non-zero number
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

/// Group rows into a category map; later rows win for duplicate keys
pub fn to_category_map<'a>(prefs: impl IntoIterator<Item = &'a Preference>) -> CategoryMap {
    let mut map = CategoryMap::new();
    for pref in prefs {
        map.entry(pref.category.clone())
            .or_default()
            .insert(pref.key.clone(), pref.value.clone());
    }
    map
}

/// A feedback entry for the feedback listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: String,
    pub participant_id: Option<String>,
    /// "Activity Creator" when the feedback has no participant
    pub participant_name: String,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}
