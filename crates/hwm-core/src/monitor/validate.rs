//! Shape checks for raw status payloads.
//!
//! Two shapes are accepted: an object carrying `homeworks` (array) and
//! `current_date`, or a bare array whose first element carries `homeworks`.
//! Key presence is always checked before value type, so an absent key is
//! reported as [`PollError::MissingKey`] and never as a type mismatch.

use serde_json::Value;

use super::error::PollError;

pub const HOMEWORKS_KEY: &str = "homeworks";
pub const CURRENT_DATE_KEY: &str = "current_date";

pub fn validate(raw: &Value) -> Result<Vec<Value>, PollError> {
    match raw {
        Value::Array(entries) => {
            let first = entries.first().ok_or(PollError::MissingKey(HOMEWORKS_KEY))?;
            homeworks_of(first)
        }
        Value::Object(_) => {
            let homeworks = homeworks_of(raw)?;
            if is_absent(raw.get(CURRENT_DATE_KEY)) {
                return Err(PollError::MissingKey(CURRENT_DATE_KEY));
            }
            Ok(homeworks)
        }
        other => Err(PollError::SchemaType {
            field: "response",
            expected: "object or array",
            found: type_name(other),
        }),
    }
}

/// Server time reported alongside the homeworks, if the payload carries one.
pub fn current_date(raw: &Value) -> Option<i64> {
    raw.get(CURRENT_DATE_KEY).and_then(Value::as_i64)
}

fn homeworks_of(container: &Value) -> Result<Vec<Value>, PollError> {
    let value = container.get(HOMEWORKS_KEY);
    if is_absent(value) {
        return Err(PollError::MissingKey(HOMEWORKS_KEY));
    }
    match value {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(PollError::SchemaType {
            field: HOMEWORKS_KEY,
            expected: "array",
            found: type_name(other),
        }),
        None => Err(PollError::MissingKey(HOMEWORKS_KEY)),
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
