//! Transmissible error descriptors.
//!
//! Every failure that crosses the worker boundary is normalized into a
//! [`DbError`] exactly once, encoded as a plain JSON object, and can be
//! reconstructed into an equivalent error on the receiving side. The same
//! shape carries routing errors (unknown method, missing registration),
//! operation errors from the database, and uncaught asynchronous failures.

use std::error::Error as StdError;

use serde_json::{Map, Value};
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// A normalized, transmissible error.
///
/// Preserves at minimum a symbolic name and a human-readable message;
/// `status` and any extra diagnostic fields survive the round trip when
/// present.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{name}: {message}")]
pub struct DbError {
    /// Symbolic error kind (e.g. `not_found`, `bad_request`).
    pub name: String,
    /// Human-readable description.
    pub message: String,
    /// Optional HTTP-like status code.
    pub status: Option<u16>,
    /// Additional diagnostic fields carried through verbatim.
    pub extra: Map<String, Value>,
}

impl DbError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            status: None,
            extra: Map::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Routing error: the operation name is not part of the protocol.
    pub fn unknown_method(method: &str) -> Self {
        Self::new("bad_request", format!("unknown API method: {method}")).with_status(400)
    }

    /// Routing error: arguments did not validate for a known operation.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new("bad_request", detail).with_status(400)
    }

    /// Routing error: no database is registered for the client.
    pub fn db_not_found() -> Self {
        Self::new("not_found", "db not found").with_status(404)
    }

    /// Routing error: createDatabase was called without a usable name.
    pub fn missing_database_name() -> Self {
        Self::new("bad_request", "you must provide a database name").with_status(400)
    }

    /// The document (or one of its attachments) does not exist.
    pub fn missing_doc() -> Self {
        Self::new("not_found", "missing").with_status(404)
    }

    /// Normalize a native failure, preserving its message.
    pub fn from_failure(failure: &(dyn StdError + 'static)) -> Self {
        Self::new("Error", failure.to_string())
    }

    /// Encode into the wire content shape:
    /// `{"error": true, "name": …, "message": …, ["status": …], …extra}`.
    pub fn to_content(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("error".to_string(), Value::Bool(true));
        fields.insert("name".to_string(), Value::String(self.name.clone()));
        fields.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(status) = self.status {
            fields.insert("status".to_string(), status.into());
        }
        for (key, value) in &self.extra {
            if !fields.contains_key(key) {
                fields.insert(key.clone(), value.clone());
            }
        }
        Value::Object(fields)
    }

    /// Reconstruct an error from wire content.
    ///
    /// Objects already shaped like a descriptor pass through; anything else
    /// is wrapped so that at least a message survives.
    pub fn from_content(content: Value) -> Self {
        match content {
            Value::Object(mut fields) => {
                fields.remove("error");
                let name =
                    take_string(&mut fields, "name").unwrap_or_else(|| "Error".to_string());
                let message = take_string(&mut fields, "message")
                    .or_else(|| take_string(&mut fields, "reason"))
                    .unwrap_or_else(|| "unknown error".to_string());
                let status = fields
                    .remove("status")
                    .and_then(|value| value.as_u64())
                    .and_then(|status| u16::try_from(status).ok());
                Self {
                    name,
                    message,
                    status,
                    extra: fields,
                }
            }
            Value::String(message) => Self::new("Error", message),
            other => Self::new("Error", other.to_string()),
        }
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(value)) => Some(value),
        Some(other) => {
            // wrong type: leave it for `extra`
            fields.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::from_failure(&err)
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_failure(&err)
    }
}
