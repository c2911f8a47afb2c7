//! Change-feed types shared between the host and database implementations.
//!
//! A feed is a tagged-variant event stream plus an idempotent cancel
//! handle: implementations emit zero or more [`FeedEvent::Change`] events
//! followed by exactly one of [`FeedEvent::Complete`] or
//! [`FeedEvent::Failed`]. Cancellation is advisory; the implementation
//! observes it and still terminates through the normal event path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, Notify};

use crate::protocol::DbError;

/// Options for opening a change feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangesOptions {
    /// Keep the feed open and stream new changes as they happen.
    pub live: bool,

    /// Sequence to resume from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<Value>,

    /// Attach the document body to each change.
    pub include_docs: bool,

    /// Collect the full document array in the completion payload. Forced on
    /// for bulk reads, where the receiving side reconstructs change events
    /// from the array.
    #[serde(alias = "returnDocs")]
    pub return_docs: bool,

    /// Implementation-specific options carried through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChangesOptions {
    pub fn from_value(value: Value) -> Result<Self, DbError> {
        serde_json::from_value(value)
            .map_err(|err| DbError::bad_request(format!("invalid changes options: {err}")))
    }
}

/// One event on a change feed.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A single change; zero or more per feed.
    Change(Value),
    /// Terminal: the feed finished with this completion payload.
    Complete(Value),
    /// Terminal: the feed failed.
    Failed(DbError),
}

/// A change feed handle: the event stream and its cancellation.
#[derive(Debug)]
pub struct ChangesFeed {
    pub events: mpsc::UnboundedReceiver<FeedEvent>,
    pub cancel: CancelHandle,
}

impl ChangesFeed {
    /// Create a feed together with the sender half a database
    /// implementation pushes events into.
    pub fn channel() -> (mpsc::UnboundedSender<FeedEvent>, ChangesFeed) {
        let (tx, events) = mpsc::unbounded_channel();
        (
            tx,
            ChangesFeed {
                events,
                cancel: CancelHandle::new(),
            },
        )
    }
}

/// Idempotent cancellation handle for a change feed.
///
/// Safe to invoke any number of times and after the feed has already
/// terminated; only the first call has any effect.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested. Returns immediately if it
    /// already was.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}
