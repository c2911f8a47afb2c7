//! Controller-side connection to a worker host.
//!
//! A [`Connection`] is one logical client: it owns the client identifier,
//! builds envelopes with fresh request ids, and keeps a map of pending
//! request ids to response channels so that many operations can be in
//! flight concurrently. A background demux task routes each inbound
//! message to the right waiter; update events from live subscriptions flow
//! into per-subscription streams, and `uncaughtError` broadcasts surface
//! through [`Connection::uncaught_errors`].
//!
//! # Example
//!
//! ```ignore
//! use warren::client::Connection;
//! use warren::config::ClientSettings;
//! use serde_json::json;
//!
//! let conn = Connection::new("client-1", to_worker, from_worker, ClientSettings::default());
//!
//! conn.create_database(json!("mydb")).await?;
//! conn.put(json!({"_id": "a", "value": 1})).await?;
//! let doc = conn.get("a").await?;
//! ```

mod error;

pub use error::{ClientError, ClientResult};

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::config::ClientSettings;
use crate::protocol::{methods, DbError, Envelope, OutboundMessage};

/// One pending request id and where its messages go.
enum Pending {
    /// Plain call: a single terminal response.
    Call(oneshot::Sender<Result<Value, DbError>>),
    /// Live subscription: update events plus one terminal response.
    Subscription {
        updates: mpsc::UnboundedSender<Value>,
        terminal: oneshot::Sender<Result<Value, DbError>>,
    },
}

type PendingMap = Arc<Mutex<HashMap<String, Pending>>>;

/// Async connection to a worker-hosted database.
pub struct Connection {
    client_id: String,

    /// Sender for envelopes toward the worker.
    transport: mpsc::UnboundedSender<Value>,

    /// Map of pending request ids to response channels.
    pending: PendingMap,

    /// Broadcast stream of uncaught worker errors; taken once.
    uncaught: Mutex<Option<mpsc::UnboundedReceiver<DbError>>>,

    /// Request timeout duration.
    timeout: Duration,

    /// Handle to the background demux task.
    _demux_task: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Open a connection over a pair of transport channels.
    ///
    /// `transport` carries envelopes to the worker; `inbound` delivers the
    /// worker's outbound messages for this client's channel.
    pub fn new(
        client_id: impl Into<String>,
        transport: mpsc::UnboundedSender<Value>,
        inbound: mpsc::UnboundedReceiver<Value>,
        settings: ClientSettings,
    ) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (uncaught_tx, uncaught_rx) = mpsc::unbounded_channel();
        let demux_task = Self::spawn_demux(inbound, pending.clone(), uncaught_tx);

        Self {
            client_id: client_id.into(),
            transport,
            pending,
            uncaught: Mutex::new(Some(uncaught_rx)),
            timeout: settings.timeout(),
            _demux_task: demux_task,
        }
    }

    /// Spawn the background task that routes inbound messages to waiters.
    fn spawn_demux(
        mut inbound: mpsc::UnboundedReceiver<Value>,
        pending: PendingMap,
        uncaught: mpsc::UnboundedSender<DbError>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let message = match serde_json::from_value::<OutboundMessage>(message) {
                    Ok(message) => message,
                    Err(_) => {
                        debug!("ignoring unrecognized message from worker");
                        continue;
                    }
                };
                match message {
                    OutboundMessage::Success {
                        message_id,
                        content,
                        ..
                    } => Self::settle(&pending, &message_id, Ok(content)).await,
                    OutboundMessage::Error {
                        message_id,
                        content,
                        ..
                    } => {
                        Self::settle(&pending, &message_id, Err(DbError::from_content(content)))
                            .await;
                    }
                    OutboundMessage::Update {
                        message_id,
                        content,
                        ..
                    } => {
                        let pending = pending.lock().await;
                        if let Some(Pending::Subscription { updates, .. }) =
                            pending.get(&message_id)
                        {
                            let _ = updates.send(content);
                        }
                    }
                    OutboundMessage::UncaughtError { content, .. } => {
                        let _ = uncaught.send(DbError::from_content(content));
                    }
                }
            }

            // worker channel closed: fail everything still pending
            let closed = || DbError::new("Error", "worker connection closed");
            let mut pending = pending.lock().await;
            for (_, slot) in pending.drain() {
                match slot {
                    Pending::Call(tx) => {
                        let _ = tx.send(Err(closed()));
                    }
                    Pending::Subscription { terminal, .. } => {
                        let _ = terminal.send(Err(closed()));
                    }
                }
            }
        })
    }

    /// Deliver a terminal response to whoever is waiting on `message_id`.
    async fn settle(pending: &PendingMap, message_id: &str, result: Result<Value, DbError>) {
        let slot = pending.lock().await.remove(message_id);
        match slot {
            Some(Pending::Call(tx)) => {
                let _ = tx.send(result);
            }
            Some(Pending::Subscription { terminal, .. }) => {
                let _ = terminal.send(result);
            }
            None => {}
        }
    }

    /// Send one operation and wait for its terminal response.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be sent, the request times
    /// out (the pending entry is cleaned up to prevent a leak), the
    /// connection closes underneath the request, or the worker answers
    /// with an error response.
    pub async fn request(&self, operation: &str, args: Vec<Value>) -> ClientResult<Value> {
        let message_id = Uuid::new_v4().to_string();

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(message_id.clone(), Pending::Call(tx));

        if let Err(error) = self.post_envelope(operation, &message_id, args) {
            self.pending.lock().await.remove(&message_id);
            return Err(error);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result.map_err(ClientError::Remote),
            Ok(Err(_)) => Err(ClientError::ChannelClosed),
            Err(_) => {
                // clean up the pending entry to prevent a leak
                self.pending.lock().await.remove(&message_id);
                Err(ClientError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    fn post_envelope(
        &self,
        operation: &str,
        message_id: &str,
        args: Vec<Value>,
    ) -> ClientResult<()> {
        let envelope = Envelope {
            operation: operation.to_string(),
            client_id: self.client_id.clone(),
            message_id: message_id.to_string(),
            args,
        };
        let value = serde_json::to_value(&envelope).map_err(ClientError::SerializeFailed)?;
        self.transport.send(value).map_err(|_| ClientError::SendFailed)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Take the stream of uncaught worker errors. These are
    /// connection-level signals, not responses to any pending call; the
    /// stream can only be taken once.
    pub async fn uncaught_errors(&self) -> Option<mpsc::UnboundedReceiver<DbError>> {
        self.uncaught.lock().await.take()
    }
}

// Convenience methods for the protocol's operations
impl Connection {
    /// Ensure the database is open on the worker. Safe to repeat; the
    /// second call reports `exists: true` instead of replacing anything.
    pub async fn create_database(&self, options: Value) -> ClientResult<Value> {
        self.request(methods::CREATE_DATABASE, vec![options]).await
    }

    /// Identity echo.
    pub async fn id(&self) -> ClientResult<Value> {
        self.request(methods::ID, Vec::new()).await
    }

    pub async fn info(&self) -> ClientResult<Value> {
        self.request(methods::INFO, Vec::new()).await
    }

    pub async fn put(&self, doc: Value) -> ClientResult<Value> {
        self.request(methods::PUT, vec![doc]).await
    }

    pub async fn post(&self, doc: Value) -> ClientResult<Value> {
        self.request(methods::POST, vec![doc]).await
    }

    pub async fn get(&self, doc_id: &str) -> ClientResult<Value> {
        self.request(methods::GET, vec![json!(doc_id)]).await
    }

    pub async fn get_with(&self, doc_id: &str, options: Value) -> ClientResult<Value> {
        self.request(methods::GET, vec![json!(doc_id), options]).await
    }

    pub async fn remove(&self, doc: Value) -> ClientResult<Value> {
        self.request(methods::REMOVE, vec![doc]).await
    }

    pub async fn all_docs(&self, options: Value) -> ClientResult<Value> {
        self.request(methods::ALL_DOCS, vec![options]).await
    }

    pub async fn bulk_docs(&self, docs: Value, options: Value) -> ClientResult<Value> {
        self.request(methods::BULK_DOCS, vec![docs, options]).await
    }

    pub async fn revs_diff(&self, revs: Value) -> ClientResult<Value> {
        self.request(methods::REVS_DIFF, vec![revs]).await
    }

    pub async fn compact(&self) -> ClientResult<Value> {
        self.request(methods::COMPACT, Vec::new()).await
    }

    pub async fn view_cleanup(&self) -> ClientResult<Value> {
        self.request(methods::VIEW_CLEANUP, Vec::new()).await
    }

    pub async fn query(&self, view: Value, options: Value) -> ClientResult<Value> {
        self.request(methods::QUERY, vec![view, options]).await
    }

    pub async fn get_attachment(
        &self,
        doc_id: &str,
        attachment_id: &str,
        options: Value,
    ) -> ClientResult<Value> {
        self.request(
            methods::GET_ATTACHMENT,
            vec![json!(doc_id), json!(attachment_id), options],
        )
        .await
    }

    pub async fn put_attachment(
        &self,
        doc_id: &str,
        attachment_id: &str,
        rev: Option<&str>,
        body: Value,
        content_type: &str,
    ) -> ClientResult<Value> {
        let rev = rev.map_or(Value::Null, |rev| json!(rev));
        self.request(
            methods::PUT_ATTACHMENT,
            vec![
                json!(doc_id),
                json!(attachment_id),
                rev,
                body,
                json!(content_type),
            ],
        )
        .await
    }

    pub async fn remove_attachment(
        &self,
        doc_id: &str,
        attachment_id: &str,
        rev: &str,
    ) -> ClientResult<Value> {
        self.request(
            methods::REMOVE_ATTACHMENT,
            vec![json!(doc_id), json!(attachment_id), json!(rev)],
        )
        .await
    }

    /// Bulk (non-streaming) change feed read.
    pub async fn changes(&self, options: Value) -> ClientResult<Value> {
        self.request(methods::CHANGES, vec![options]).await
    }

    /// Open a live change subscription.
    ///
    /// Updates arrive on the returned [`LiveChanges`] stream; the terminal
    /// response is available through [`LiveChanges::result`]. No timeout
    /// applies; the subscription lives until it completes, fails, or is
    /// cancelled.
    pub async fn live_changes(&self, mut options: Value) -> ClientResult<LiveChanges> {
        if let Value::Object(fields) = &mut options {
            fields.insert("live".to_string(), Value::Bool(true));
        }

        let message_id = Uuid::new_v4().to_string();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (terminal_tx, terminal_rx) = oneshot::channel();
        self.pending.lock().await.insert(
            message_id.clone(),
            Pending::Subscription {
                updates: updates_tx,
                terminal: terminal_tx,
            },
        );

        if let Err(error) = self.post_envelope(methods::LIVE_CHANGES, &message_id, vec![options]) {
            self.pending.lock().await.remove(&message_id);
            return Err(error);
        }

        Ok(LiveChanges {
            message_id,
            client_id: self.client_id.clone(),
            transport: self.transport.clone(),
            updates: updates_rx,
            terminal: terminal_rx,
        })
    }

    pub async fn destroy(&self) -> ClientResult<Value> {
        self.request(methods::DESTROY, Vec::new()).await
    }

    /// Deregister this client's database on the worker. Local bookkeeping
    /// only (the database itself is untouched) and fire-and-forget: the
    /// worker sends no response.
    pub fn close(&self) -> ClientResult<()> {
        let message_id = Uuid::new_v4().to_string();
        self.post_envelope(methods::CLOSE, &message_id, Vec::new())
    }
}

/// A live change subscription.
///
/// Yields update payloads as a [`Stream`]; the stream ends when the
/// subscription reaches its terminal event, after which
/// [`result`](LiveChanges::result) returns the completion payload or the
/// error.
pub struct LiveChanges {
    message_id: String,
    client_id: String,
    transport: mpsc::UnboundedSender<Value>,
    updates: mpsc::UnboundedReceiver<Value>,
    terminal: oneshot::Receiver<Result<Value, DbError>>,
}

impl LiveChanges {
    /// The request id this subscription is registered under.
    pub fn request_id(&self) -> &str {
        &self.message_id
    }

    /// Ask the worker to cancel the subscription.
    ///
    /// Advisory: the feed terminates through its normal path and the
    /// terminal response still arrives via [`result`](LiveChanges::result).
    pub fn cancel(&self) {
        let envelope = Envelope {
            operation: methods::CANCEL_CHANGES.to_string(),
            client_id: self.client_id.clone(),
            message_id: self.message_id.clone(),
            args: Vec::new(),
        };
        if let Ok(value) = serde_json::to_value(&envelope) {
            let _ = self.transport.send(value);
        }
    }

    /// Receive the next update, or `None` once the subscription has
    /// terminated.
    pub async fn next_update(&mut self) -> Option<Value> {
        self.updates.recv().await
    }

    /// Await the terminal response.
    pub async fn result(self) -> ClientResult<Value> {
        match self.terminal.await {
            Ok(result) => result.map_err(ClientError::Remote),
            Err(_) => Err(ClientError::ChannelClosed),
        }
    }
}

impl Stream for LiveChanges {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.updates.poll_recv(cx)
    }
}
