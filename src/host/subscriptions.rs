//! Live subscription management.
//!
//! A live subscription exists from the moment its request is accepted until
//! its feed reports a terminal event. Updates and the terminal response are
//! emitted by a single pump task, so within one subscription an update can
//! never follow the terminal message. Cancellation is advisory and arrives
//! out of band; the registration is only removed once the feed actually
//! terminates.

use tracing::debug;

use crate::backend::{ChangesOptions, FeedEvent};
use crate::protocol::{ClientId, DbError, RequestId};

use super::DatabaseHost;

impl DatabaseHost {
    /// Open a streaming change feed for `message_id`.
    pub(crate) fn live_changes(
        &self,
        client_id: ClientId,
        message_id: RequestId,
        options: ChangesOptions,
    ) {
        let Some(db) = self.database(&client_id) else {
            self.send_error(&client_id, &message_id, &DbError::db_not_found());
            return;
        };

        let mut feed = db.changes(options);
        self.inner
            .subscriptions
            .insert(message_id.clone(), feed.cancel.clone());

        let host = self.clone();
        tokio::spawn(async move {
            loop {
                match feed.events.recv().await {
                    Some(FeedEvent::Change(change)) => {
                        host.send_update(&client_id, &message_id, change);
                    }
                    Some(FeedEvent::Complete(result)) => {
                        host.send_success(&client_id, &message_id, result);
                        break;
                    }
                    Some(FeedEvent::Failed(error)) => {
                        host.send_error(&client_id, &message_id, &error);
                        break;
                    }
                    None => {
                        // a feed must terminate through Complete or Failed;
                        // keep the exactly-one-terminal guarantee anyway
                        host.send_error(
                            &client_id,
                            &message_id,
                            &DbError::new("Error", "changes feed closed unexpectedly"),
                        );
                        break;
                    }
                }
            }
            host.inner.subscriptions.remove(&message_id);
            debug!(request = %message_id, "live subscription terminated");
        });
    }

    /// Cancel the live subscription registered under `request_id`.
    ///
    /// Advisory: the feed is asked to stop and will terminate through its
    /// normal event path; no separate cancellation response is synthesized.
    /// Unknown request ids are a silent no-op.
    pub(crate) fn cancel_changes(&self, request_id: &str) {
        let subscription = self
            .inner
            .subscriptions
            .get(request_id)
            .map(|entry| entry.value().clone());
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }
}
