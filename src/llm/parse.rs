//! Response parsing and history shaping
//!
//! Models are asked to answer with a JSON object but often wrap it in a
//! markdown fence or surround it with prose.

use crate::models::{ChatRole, ChatTurn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("valid fenced block pattern")
});

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") on the opening line
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Find the JSON object in a model response: the whole text, a fenced
/// block, or the span from the first `{` to the last `}`
pub fn extract_json_object(text: &str) -> Option<Value> {
    let as_object = |candidate: &str| {
        serde_json::from_str::<Value>(candidate.trim())
            .ok()
            .filter(Value::is_object)
    };

    if let Some(value) = as_object(strip_code_fence(text)) {
        return Some(value);
    }

    if let Some(value) = FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| as_object(m.as_str()))
    {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    as_object(&text[start..=end])
}

/// Build the message list for a completion: prior turns followed by the new
/// user message.
///
/// Empty turns are dropped, leading assistant turns are removed so the
/// conversation starts with the user, and consecutive turns from the same
/// speaker are merged.
pub fn prepare_history(history: &[ChatTurn], message: &str) -> Vec<ChatTurn> {
    let mut turns: Vec<ChatTurn> = Vec::with_capacity(history.len() + 1);
    let incoming = history
        .iter()
        .cloned()
        .chain(std::iter::once(ChatTurn::user(message)));

    for turn in incoming {
        if turn.content.trim().is_empty() {
            continue;
        }
        if turns.is_empty() && turn.role != ChatRole::User {
            continue;
        }
        match turns.last_mut() {
            Some(last) if last.role == turn.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&turn.content);
            }
            _ => turns.push(turn),
        }
    }
    turns
}

/// Readable label for a preference key: "dietary_restrictions" ->
/// "Dietary restrictions"
pub fn humanize_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
