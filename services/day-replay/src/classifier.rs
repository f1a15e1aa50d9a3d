//! On/off classification of raw entity states

use serde::{Deserialize, Serialize};

/// Raw values that always read as "on" under the fallback heuristic
pub const ON_TOKENS: [&str; 8] = [
    "on", "open", "true", "home", "active", "playing", "cooling", "heating",
];

/// Raw values that always read as "off" under the fallback heuristic
pub const OFF_TOKENS: [&str; 8] = [
    "off",
    "closed",
    "false",
    "away",
    "idle",
    "paused",
    "unavailable",
    "unknown",
];

/// Entity domains whose state is a strict boolean with `on` as the true token
const BINARY_BOOLEAN_DOMAINS: [&str; 1] = ["input_boolean"];

/// Classification rule for one entity, resolved once from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum EntityRule {
    /// Active iff the raw value is one of these (exact, case-sensitive)
    OnValues(Vec<String>),
    /// Active iff the raw value equals this one
    OnValue(String),
    /// Strict boolean domain; active iff the raw value is `on`
    BinaryBoolean,
    /// Canonical tokens, then numeric sign, then "not a known off token"
    #[default]
    Heuristic,
}

impl EntityRule {
    /// Resolve the rule for an entity from its optional overrides.
    ///
    /// An explicit `on_states` list wins even when empty; an empty `on_state`
    /// is treated as absent.
    pub fn resolve(entity_id: &str, on_states: Option<&[String]>, on_state: Option<&str>) -> Self {
        if let Some(values) = on_states {
            return EntityRule::OnValues(values.to_vec());
        }
        if let Some(value) = on_state.filter(|v| !v.is_empty()) {
            return EntityRule::OnValue(value.to_string());
        }
        let domain = entity_id.split('.').next().unwrap_or_default();
        if BINARY_BOOLEAN_DOMAINS.contains(&domain) {
            return EntityRule::BinaryBoolean;
        }
        EntityRule::Heuristic
    }
}

/// Decide whether a raw state value means the entity is active.
///
/// A missing value is always "off".
pub fn classify(raw: Option<&str>, rule: &EntityRule) -> bool {
    let Some(raw) = raw else {
        return false;
    };

    match rule {
        EntityRule::OnValues(values) => values.iter().any(|v| v == raw),
        EntityRule::OnValue(value) => raw == value,
        EntityRule::BinaryBoolean => raw == "on",
        EntityRule::Heuristic => classify_heuristic(raw),
    }
}

fn classify_heuristic(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    if ON_TOKENS.contains(&lower.as_str()) {
        return true;
    }
    if OFF_TOKENS.contains(&lower.as_str()) {
        return false;
    }
    match raw.trim().parse::<f64>() {
        Ok(number) if number.is_finite() => number > 0.0,
        _ => true,
    }
}
