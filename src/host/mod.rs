//! Worker-side host: envelope routing, registries, and dispatch.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Controller (client)                      │
//! └──────────────────────────────────────────────────────────────┘
//!        │ envelopes (JSON)                    ▲ success / error /
//!        ▼                                     │ update / uncaughtError
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DatabaseHost                          │
//! │  handle() ─ validate envelope, parse typed request           │
//! │  databases:     client id  → database handle                 │
//! │  subscriptions: request id → cancel handle                   │
//! └──────────────────────────────────────────────────────────────┘
//!        │ named async operations
//!        ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │            Database implementations (via opener)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One host instance per process/session owns both registries; there is no
//! ambient state. Every in-flight operation is its own tokio task, so a
//! slow database call never stops unrelated messages from being routed.

mod dispatch;
mod registry;
mod subscriptions;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::{CancelHandle, Database, DatabaseOpener};
use crate::config::HostSettings;
use crate::protocol::{
    methods, ClientId, DbError, Envelope, OutboundMessage, Request, RequestId,
};

/// Worker-side coordinator.
///
/// Cheap to clone; all clones share the same registries and outbound
/// channel.
#[derive(Clone)]
pub struct DatabaseHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    opener: Box<dyn DatabaseOpener>,
    settings: HostSettings,
    databases: DashMap<ClientId, Arc<dyn Database>>,
    subscriptions: DashMap<RequestId, CancelHandle>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

impl DatabaseHost {
    /// Create a host around a database opener.
    ///
    /// Returns the receiver of outbound messages; the embedding transport
    /// drains it and posts each message to the controller's channel.
    pub fn new(
        opener: impl DatabaseOpener,
        settings: HostSettings,
    ) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let host = Self {
            inner: Arc::new(HostInner {
                opener: Box::new(opener),
                settings,
                databases: DashMap::new(),
                subscriptions: DashMap::new(),
                outbound,
            }),
        };
        (host, receiver)
    }

    /// Handle one inbound payload.
    ///
    /// Payloads that do not carry all four envelope fields belong to some
    /// other protocol sharing the channel and are ignored. `close` is a
    /// purely local deregistration handled synchronously with no response;
    /// everything else parses into a typed request and dispatches.
    pub fn handle(&self, message: Value) {
        let Some(envelope) = Envelope::parse(&message) else {
            debug!("ignoring message without envelope fields");
            return;
        };
        let Envelope {
            operation,
            client_id,
            message_id,
            args,
        } = envelope;

        if operation == methods::CLOSE {
            self.close_client(&client_id);
            return;
        }

        match Request::parse(&operation, args) {
            Ok(request) => self.dispatch(client_id, message_id, request),
            Err(error) => {
                debug!(%operation, "rejected request: {error}");
                self.send_error(&client_id, &message_id, &error);
            }
        }
    }

    /// Whether a database is currently registered for the client.
    pub fn has_database(&self, client_id: &str) -> bool {
        self.inner.databases.contains_key(client_id)
    }

    /// Whether a live subscription is currently registered for the request
    /// id.
    pub fn has_subscription(&self, request_id: &str) -> bool {
        self.inner.subscriptions.contains_key(request_id)
    }

    pub(crate) fn database(&self, client_id: &str) -> Option<Arc<dyn Database>> {
        self.inner
            .databases
            .get(client_id)
            .map(|entry| entry.value().clone())
    }

    fn send(&self, message: OutboundMessage) {
        // the controller may already be gone; nothing useful to do then
        let _ = self.inner.outbound.send(message);
    }

    pub(crate) fn send_success(&self, client_id: &str, message_id: &str, content: Value) {
        self.send(OutboundMessage::success(client_id, message_id, content));
    }

    pub(crate) fn send_error(&self, client_id: &str, message_id: &str, error: &DbError) {
        self.send(OutboundMessage::error(client_id, message_id, error));
    }

    pub(crate) fn send_update(&self, client_id: &str, message_id: &str, content: Value) {
        self.send(OutboundMessage::update(client_id, message_id, content));
    }

    pub(crate) fn send_uncaught(&self, client_id: &str, error: &DbError) {
        self.send(OutboundMessage::uncaught_error(client_id, error));
    }
}
