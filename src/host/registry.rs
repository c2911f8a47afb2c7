//! Database registry lifecycle: create, reuse, close, destroy.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::UncaughtErrors;
use crate::protocol::{ClientId, DbError, RequestId};

use super::DatabaseHost;

impl DatabaseHost {
    /// Open (or re-open) the database registered for `client_id`.
    ///
    /// Repeated creates are idempotent: an existing registration is kept
    /// as-is (its uncaught-error relay included) and reported back with an
    /// `exists` flag, so a reconnecting controller can safely re-issue its
    /// "ensure open" call. The second request's options are not checked
    /// against the original ones.
    pub(crate) fn create_database(
        &self,
        client_id: ClientId,
        message_id: RequestId,
        name: Option<String>,
        options: Value,
    ) {
        if self.inner.databases.contains_key(&client_id) {
            self.send_success(&client_id, &message_id, json!({"ok": true, "exists": true}));
            return;
        }

        let Some(name) = name else {
            self.send_error(&client_id, &message_id, &DbError::missing_database_name());
            return;
        };

        let name = match self.inner.settings.resolved_prefix() {
            Ok(Some(prefix)) => format!("{prefix}{name}"),
            Ok(None) => name,
            Err(error) => {
                self.send_error(&client_id, &message_id, &DbError::from_failure(&error));
                return;
            }
        };

        let db = self.inner.opener.open(&name, &options);
        // registered before any asynchronous confirmation
        self.inner.databases.insert(client_id.clone(), db.clone());

        match db.subscribe_errors() {
            Ok(errors) => {
                self.spawn_uncaught_relay(client_id.clone(), errors);
                self.send_success(&client_id, &message_id, json!({"ok": true}));
            }
            Err(error) => {
                // the registration stays in place even though the relay is
                // missing; repeated creates will not retry the subscription
                self.send_error(&client_id, &message_id, &error);
            }
        }
    }

    /// Local deregistration. Never touches the handle's own teardown and
    /// produces no response; closing an unknown client is a no-op.
    pub(crate) fn close_client(&self, client_id: &str) {
        if self.inner.databases.remove(client_id).is_some() {
            debug!(client = %client_id, "closed database registration");
        }
    }

    /// Destroy the client's database.
    ///
    /// The registry entry is removed before the underlying destroy is
    /// awaited, so no new operation can resolve the dying handle; the
    /// destroy's real outcome is still reported to this request id.
    pub(crate) fn destroy_database(
        &self,
        client_id: ClientId,
        message_id: RequestId,
        options: Value,
    ) {
        let Some((_, db)) = self.inner.databases.remove(&client_id) else {
            self.send_error(&client_id, &message_id, &DbError::db_not_found());
            return;
        };

        let host = self.clone();
        tokio::spawn(async move {
            match db.destroy(options).await {
                Ok(content) => host.send_success(&client_id, &message_id, content),
                Err(error) => host.send_error(&client_id, &message_id, &error),
            }
        });
    }

    fn spawn_uncaught_relay(&self, client_id: ClientId, mut errors: UncaughtErrors) {
        let host = self.clone();
        tokio::spawn(async move {
            while let Some(error) = errors.recv().await {
                warn!(client = %client_id, "uncaught database error: {error}");
                host.send_uncaught(&client_id, &error);
            }
        });
    }
}
