//! # Filter Patterns
//!
//! Declarative structural matcher over JSON event payloads.
//!
//! A pattern is a map from payload key to [`Matcher`]:
//!
//! | Pattern JSON                     | Matcher                 | Meaning                       |
//! |----------------------------------|-------------------------|-------------------------------|
//! | `"request"` / `5` / `true`       | `Equals`                | value must be equal           |
//! | `["request", "response"]`        | `OneOf`                 | value must equal one entry    |
//! | `{"exists": true}`               | `Exists(true)`          | key must be present           |
//! | `{"exists": false}`              | `Exists(false)`         | key must be absent            |
//! | `{"nested": ...}` (other object) | `Nested`                | recurse into an object value  |
//!
//! Keys not named by the pattern accept any value (or absence).

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from parsing a pattern.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern root must be a JSON object.
    #[error("Pattern must be a JSON object, got {0}")]
    NotAnObject(String),

    /// `exists` must be a boolean.
    #[error("Pattern key '{key}': 'exists' must be a boolean")]
    InvalidExists {
        /// Key carrying the bad matcher.
        key: String,
    },

    /// One-of lists must not be empty.
    #[error("Pattern key '{key}': one-of list is empty")]
    EmptyOneOf {
        /// Key carrying the bad matcher.
        key: String,
    },
}

/// Predicate for one payload key.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Value must equal this one.
    Equals(Value),
    /// Value must equal one of these.
    OneOf(Vec<Value>),
    /// Key must be present (`true`) or absent (`false`).
    Exists(bool),
    /// Value must be an object matching the nested pattern.
    Nested(FilterPattern),
}

impl Matcher {
    fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Self::Exists(expected), v) => v.is_some() == *expected,
            (_, None) => false,
            (Self::Equals(expected), Some(v)) => v == expected,
            (Self::OneOf(options), Some(v)) => options.iter().any(|o| o == v),
            (Self::Nested(pattern), Some(Value::Object(obj))) => pattern.matches_object(obj),
            (Self::Nested(_), Some(_)) => false,
        }
    }
}

/// Structural predicate over an event payload.
///
/// The empty pattern matches every payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPattern {
    fields: BTreeMap<String, Matcher>,
}

impl FilterPattern {
    /// Pattern that accepts everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn equals(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), Matcher::Equals(value.into()));
        self
    }

    /// Require `key` to equal one of `values`.
    pub fn one_of<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.fields.insert(key.into(), Matcher::OneOf(values));
        self
    }

    /// Require `key` to be present.
    pub fn exists(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), Matcher::Exists(true));
        self
    }

    /// Require `key` to be absent.
    pub fn absent(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), Matcher::Exists(false));
        self
    }

    /// Require `key` to be an object matching `pattern`.
    pub fn nested(mut self, key: impl Into<String>, pattern: FilterPattern) -> Self {
        self.fields.insert(key.into(), Matcher::Nested(pattern));
        self
    }

    /// Parse an EventBridge-style JSON pattern.
    pub fn from_json(pattern: &Value) -> Result<Self, PatternError> {
        let Value::Object(obj) = pattern else {
            return Err(PatternError::NotAnObject(pattern.to_string()));
        };

        let mut fields = BTreeMap::new();
        for (key, raw) in obj {
            let matcher = match raw {
                Value::Array(options) if options.is_empty() => {
                    return Err(PatternError::EmptyOneOf { key: key.clone() });
                }
                Value::Array(options) => Matcher::OneOf(options.clone()),
                Value::Object(inner) if inner.len() == 1 && inner.contains_key("exists") => {
                    match inner.get("exists") {
                        Some(Value::Bool(b)) => Matcher::Exists(*b),
                        _ => return Err(PatternError::InvalidExists { key: key.clone() }),
                    }
                }
                Value::Object(_) => Matcher::Nested(Self::from_json(raw)?),
                scalar => Matcher::Equals(scalar.clone()),
            };
            fields.insert(key.clone(), matcher);
        }
        Ok(Self { fields })
    }

    /// Check a payload against the pattern.
    ///
    /// Non-object payloads only satisfy patterns that require nothing to be
    /// present.
    pub fn matches(&self, payload: &Value) -> bool {
        match payload {
            Value::Object(obj) => self.matches_object(obj),
            _ => self
                .fields
                .values()
                .all(|m| matches!(m, Matcher::Exists(false))),
        }
    }

    fn matches_object(&self, obj: &Map<String, Value>) -> bool {
        self.fields
            .iter()
            .all(|(key, matcher)| matcher.matches(obj.get(key)))
    }

    /// Number of constrained keys.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the pattern accepts everything.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_pattern_matches_everything() {
        let pattern = FilterPattern::any();
        assert!(pattern.matches(&json!({})));
        assert!(pattern.matches(&json!({"a": 1})));
        assert!(pattern.matches(&json!("scalar")));
    }

    #[test]
    fn test_equals() {
        let pattern = FilterPattern::any().equals("messageType", "request");
        assert!(pattern.matches(&json!({"messageType": "request", "x": 1})));
        assert!(!pattern.matches(&json!({"messageType": "event"})));
        assert!(!pattern.matches(&json!({})));
    }

    #[test]
    fn test_one_of() {
        let pattern = FilterPattern::any().one_of("messageType", ["request", "response"]);
        assert!(pattern.matches(&json!({"messageType": "response"})));
        assert!(!pattern.matches(&json!({"messageType": "heartbeat"})));
    }

    #[test]
    fn test_exists_and_absent() {
        let pattern = FilterPattern::any().exists("targetDivisionId");
        assert!(pattern.matches(&json!({"targetDivisionId": "div-b"})));
        assert!(pattern.matches(&json!({"targetDivisionId": null})));
        assert!(!pattern.matches(&json!({"sourceDivisionId": "div-a"})));

        let pattern = FilterPattern::any().absent("error");
        assert!(pattern.matches(&json!({"ok": true})));
        assert!(!pattern.matches(&json!({"error": "x"})));
        assert!(pattern.matches(&json!(42)));
    }

    #[test]
    fn test_nested() {
        let pattern =
            FilterPattern::any().nested("detail", FilterPattern::any().equals("level", "critical"));
        assert!(pattern.matches(&json!({"detail": {"level": "critical", "n": 2}})));
        assert!(!pattern.matches(&json!({"detail": {"level": "info"}})));
        assert!(!pattern.matches(&json!({"detail": "critical"})));
    }

    #[test]
    fn test_from_json_eventbridge_style() {
        let pattern = FilterPattern::from_json(&json!({
            "messageType": ["request", "response"],
            "targetDivisionId": {"exists": true},
            "priority": 7
        }))
        .unwrap();
        assert_eq!(pattern.len(), 3);
        assert!(pattern.matches(&json!({
            "messageType": "request",
            "targetDivisionId": "div-b",
            "priority": 7
        })));
        assert!(!pattern.matches(&json!({
            "messageType": "request",
            "priority": 7
        })));
    }

    #[test]
    fn test_from_json_errors() {
        assert!(matches!(
            FilterPattern::from_json(&json!([1, 2])),
            Err(PatternError::NotAnObject(_))
        ));
        assert!(matches!(
            FilterPattern::from_json(&json!({"k": {"exists": "yes"}})),
            Err(PatternError::InvalidExists { .. })
        ));
        assert!(matches!(
            FilterPattern::from_json(&json!({"k": []})),
            Err(PatternError::EmptyOneOf { .. })
        ));
    }
}
