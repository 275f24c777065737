use serde::Deserialize;
use serde_json::Value;

use crate::errors::DrPilotError;
use user::UserPayload;

pub mod chat;
pub mod client;
pub mod guard;
pub mod profile;
pub mod session;
pub mod store;
pub mod universities;
pub mod user;

/// Data returned by the backend on a successful login or registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthData {
    pub token: String,
    pub user: UserPayload,
}

#[derive(Deserialize)]
struct AuthEnvelope {
    data: AuthData,
}

impl AuthData {
    /// Reads `{ "data": { "token", "user" } }`.
    pub fn from_response(body: Value) -> Result<Self, DrPilotError> {
        serde_json::from_value::<AuthEnvelope>(body)
            .map(|envelope| envelope.data)
            .map_err(|e| DrPilotError::FailedToDecode(format!("auth response: {}", e)))
    }
}

/// Reads a profile answer, which comes in one of three shapes:
/// `{ "success": true, "data": {...} }`, `{ "user": {...} }`, or the bare user object.
pub fn profile_from_response(body: Value) -> Result<UserPayload, DrPilotError> {
    let record = match body {
        Value::Object(mut map) => {
            let success = map.get("success").and_then(Value::as_bool).unwrap_or(false);

            if success && map.get("data").map_or(false, Value::is_object) {
                map.remove("data").unwrap_or_default()
            } else if map.get("user").map_or(false, Value::is_object) {
                map.remove("user").unwrap_or_default()
            } else {
                Value::Object(map)
            }
        }
        other => {
            return Err(DrPilotError::FailedToDecode(format!(
                "profile response is not an object: {}",
                other
            )))
        }
    };

    serde_json::from_value(record)
        .map_err(|e| DrPilotError::FailedToDecode(format!("profile response: {}", e)))
}

/// Reads the persisted user blob: either the user object or `{ "user": {...} }`.
pub fn stored_user_from_str(blob: &str) -> Result<UserPayload, DrPilotError> {
    let value: Value = serde_json::from_str(blob)
        .map_err(|e| DrPilotError::FailedToDecode(format!("stored user: {}", e)))?;

    let record = match value {
        Value::Object(mut map) if map.get("user").map_or(false, Value::is_object) => {
            map.remove("user").unwrap_or_default()
        }
        other => other,
    };

    serde_json::from_value(record)
        .map_err(|e| DrPilotError::FailedToDecode(format!("stored user: {}", e)))
}

/// `data` of a `{ "success": true, "data": ... }` answer, `None` otherwise.
pub fn success_data(body: Value) -> Option<Value> {
    match body {
        Value::Object(mut map) if map.get("success").and_then(Value::as_bool) == Some(true) => {
            map.remove("data")
        }
        _ => None,
    }
}

/// Message of an error body: `error` (a string, or an object with `message`), then `message`.
pub fn error_message(body: &Value) -> Option<String> {
    let non_empty = |value: &Value| {
        value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    body.get("error")
        .and_then(|error| non_empty(error).or_else(|| error.get("message").and_then(non_empty)))
        .or_else(|| body.get("message").and_then(non_empty))
}
