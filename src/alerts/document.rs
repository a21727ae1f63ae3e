use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::Alert;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("document is not an object")]
    NotAnObject,
    #[error("missing or non-string field `{0}`")]
    MissingField(&'static str),
    #[error("unparseable score string {0:?}")]
    BadScoreString(String),
    #[error("unexpected score type: {0}")]
    UnexpectedScoreType(&'static str),
    #[error("invalid timestamp: {0}")]
    BadTimestamp(String),
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Encode an alert as stored: `timestamp` is epoch milliseconds.
pub fn to_document(alert: &Alert) -> Value {
    json!({
        "id": alert.id,
        "transaction_id": alert.transaction_id,
        "account_id": alert.account_id,
        "reason": alert.reason,
        "score": alert.score,
        "timestamp": alert.timestamp.timestamp_millis(),
    })
}

/// Normalize a stored score that may be a JSON number or a numeric string.
/// `NaN` and infinities are rejected in either form.
pub fn normalize_score(value: &Value) -> Result<f64, DecodeError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or(DecodeError::UnexpectedScoreType("non-finite number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| DecodeError::BadScoreString(s.clone())),
        other => Err(DecodeError::UnexpectedScoreType(type_name(other))),
    }
}

/// Decode an epoch-millisecond timestamp (number or numeric string), or an
/// RFC 3339 string.
pub fn normalize_timestamp(value: &Value) -> Result<DateTime<Utc>, DecodeError> {
    let millis = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| DecodeError::BadTimestamp(n.to_string()))?,
        Value::String(s) => match s.parse::<i64>() {
            Ok(ms) => ms,
            Err(_) => {
                return DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| DecodeError::BadTimestamp(s.clone()));
            }
        },
        other => return Err(DecodeError::BadTimestamp(type_name(other).to_string())),
    };
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| DecodeError::BadTimestamp(millis.to_string()))
}

fn string_field(doc: &serde_json::Map<String, Value>, name: &'static str) -> Result<String, DecodeError> {
    doc.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(DecodeError::MissingField(name))
}

/// Decode one stored document into an alert. Documents are weakly typed:
/// older writers stored `score` as a string.
pub fn decode_alert(value: &Value) -> Result<Alert, DecodeError> {
    let doc = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let score = normalize_score(doc.get("score").unwrap_or(&Value::Null))?;
    let timestamp = normalize_timestamp(doc.get("timestamp").unwrap_or(&Value::Null))?;
    Ok(Alert {
        id: string_field(doc, "id")?,
        transaction_id: string_field(doc, "transaction_id")?,
        account_id: string_field(doc, "account_id")?,
        reason: string_field(doc, "reason")?,
        score,
        timestamp,
    })
}
