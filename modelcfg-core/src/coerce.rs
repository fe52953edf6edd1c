//! Value coercion for user-entered field values.
//!
//! Shells hand edits over as JSON values, frequently as raw strings typed into
//! a text box. Coercion converts them to the runtime type a field is declared
//! (or observed) to have. A failure is a [`ParseError`] scoped to that one field.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use thiserror::Error;

/// A malformed value for a single field. Never affects other fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ParseError {
    pub field: String,
    pub message: String,
}

impl ParseError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Runtime type a field's value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Number,
    Boolean,
    Text,
    /// Objects and arrays; string input is parsed as JSON.
    Structured,
}

impl ValueKind {
    /// Kind of an existing value. `None` for null, which carries no type.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Boolean),
            Value::Number(_) => Some(ValueKind::Number),
            Value::String(_) => Some(ValueKind::Text),
            Value::Array(_) | Value::Object(_) => Some(ValueKind::Structured),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Text => "text",
            ValueKind::Structured => "structured",
        };
        write!(f, "{label}")
    }
}

/// Coerce `input` to `kind`. `field` only labels the error.
pub fn coerce(kind: ValueKind, field: &str, input: Value) -> Result<Value, ParseError> {
    match kind {
        ValueKind::Number => to_number(field, input),
        ValueKind::Boolean => to_boolean(field, input),
        ValueKind::Text => Ok(to_text(input)),
        ValueKind::Structured => to_structured(field, input),
    }
}

/// Coerce `input` to the kind of `reference`; a null reference accepts anything.
pub fn coerce_like(reference: &Value, field: &str, input: Value) -> Result<Value, ParseError> {
    match ValueKind::of(reference) {
        Some(kind) => coerce(kind, field, input),
        None => Ok(input),
    }
}

/// Parse raw text as JSON for a structured field.
pub fn parse_structured(field: &str, raw: &str) -> Result<Value, ParseError> {
    serde_json::from_str(raw).map_err(|e| ParseError::new(field, format!("invalid JSON: {e}")))
}

/// True for values a shell uses to mean "no value": null or blank text.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn to_number(field: &str, input: Value) -> Result<Value, ParseError> {
    match input {
        Value::Number(n) => Ok(Value::Number(n)),
        Value::String(s) => {
            let text = s.trim();
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::from(i));
            }
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| ParseError::new(field, format!("expected a number, got {s:?}")))
        }
        other => Err(ParseError::new(
            field,
            format!("expected a number, got {other}"),
        )),
    }
}

fn to_boolean(field: &str, input: Value) -> Result<Value, ParseError> {
    match input {
        Value::Bool(b) => Ok(Value::Bool(b)),
        Value::Number(n) if n.as_f64() == Some(0.0) => Ok(Value::Bool(false)),
        Value::Number(n) if n.as_f64() == Some(1.0) => Ok(Value::Bool(true)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(ParseError::new(
                field,
                format!("expected a boolean, got {s:?}"),
            )),
        },
        other => Err(ParseError::new(
            field,
            format!("expected a boolean, got {other}"),
        )),
    }
}

fn to_text(input: Value) -> Value {
    match input {
        Value::String(s) => Value::String(s),
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}

fn to_structured(field: &str, input: Value) -> Result<Value, ParseError> {
    match input {
        Value::String(s) => parse_structured(field, &s),
        other => Ok(other),
    }
}
