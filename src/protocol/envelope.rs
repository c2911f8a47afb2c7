//! Wire envelope types for controller/worker messaging.
//!
//! Every inbound call is one [`Envelope`]; every outbound message is one
//! [`OutboundMessage`]. The transport underneath only has to deliver
//! `serde_json::Value` payloads in order per client channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DbError;

/// Opaque identifier for one logical controller connection.
///
/// Supplied by the caller, never generated here; scopes a database
/// registration and all operations issued against it.
pub type ClientId = String;

/// Request identifier, unique among one client's concurrently-pending
/// requests. Correlates a request to its terminal response and, for live
/// subscriptions, to its intermediate update events.
pub type RequestId = String;

/// Inbound request envelope.
///
/// A payload missing any of the four fields is treated as foreign traffic
/// sharing the channel and is ignored rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation name (see [`methods`]).
    #[serde(rename = "type")]
    pub operation: String,

    /// Originating client.
    #[serde(rename = "id")]
    pub client_id: ClientId,

    /// Request identifier for response correlation.
    #[serde(rename = "messageId")]
    pub message_id: RequestId,

    /// Positional call arguments.
    pub args: Vec<Value>,
}

impl Envelope {
    /// Parse an arbitrary inbound payload into an envelope.
    ///
    /// Returns `None` when the payload does not carry all four envelope
    /// fields with the right types.
    pub fn parse(message: &Value) -> Option<Self> {
        serde_json::from_value(message.clone()).ok()
    }
}

/// Outbound message to the controller, tagged with its `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Terminal success response for one request.
    Success {
        id: ClientId,
        #[serde(rename = "messageId")]
        message_id: RequestId,
        content: Value,
    },

    /// Terminal error response for one request.
    Error {
        id: ClientId,
        #[serde(rename = "messageId")]
        message_id: RequestId,
        content: Value,
    },

    /// Intermediate change event from a live subscription; zero or more
    /// per request id, always before the terminal response.
    Update {
        id: ClientId,
        #[serde(rename = "messageId")]
        message_id: RequestId,
        content: Value,
    },

    /// Asynchronous failure not attributable to any pending request.
    UncaughtError { id: ClientId, content: Value },
}

impl OutboundMessage {
    pub fn success(client_id: &str, message_id: &str, content: Value) -> Self {
        Self::Success {
            id: client_id.to_string(),
            message_id: message_id.to_string(),
            content,
        }
    }

    pub fn error(client_id: &str, message_id: &str, error: &DbError) -> Self {
        Self::Error {
            id: client_id.to_string(),
            message_id: message_id.to_string(),
            content: error.to_content(),
        }
    }

    pub fn update(client_id: &str, message_id: &str, content: Value) -> Self {
        Self::Update {
            id: client_id.to_string(),
            message_id: message_id.to_string(),
            content,
        }
    }

    pub fn uncaught_error(client_id: &str, error: &DbError) -> Self {
        Self::UncaughtError {
            id: client_id.to_string(),
            content: error.to_content(),
        }
    }
}

/// Wire operation names.
pub mod methods {
    pub const CREATE_DATABASE: &str = "createDatabase";
    pub const ID: &str = "id";
    pub const INFO: &str = "info";
    pub const PUT: &str = "put";
    pub const POST: &str = "post";
    pub const GET: &str = "get";
    pub const REMOVE: &str = "remove";
    pub const ALL_DOCS: &str = "allDocs";
    pub const BULK_DOCS: &str = "bulkDocs";
    pub const REVS_DIFF: &str = "revsDiff";
    pub const COMPACT: &str = "compact";
    pub const VIEW_CLEANUP: &str = "viewCleanup";
    pub const QUERY: &str = "query";
    pub const GET_ATTACHMENT: &str = "getAttachment";
    pub const PUT_ATTACHMENT: &str = "putAttachment";
    pub const REMOVE_ATTACHMENT: &str = "removeAttachment";
    pub const CHANGES: &str = "changes";
    pub const LIVE_CHANGES: &str = "liveChanges";
    pub const CANCEL_CHANGES: &str = "cancelChanges";
    pub const DESTROY: &str = "destroy";
    pub const CLOSE: &str = "close";
}
