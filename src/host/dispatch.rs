//! Operation dispatch: one typed request in, exactly one terminal response
//! out.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::{ChangesFeed, Database, FeedEvent};
use crate::protocol::{ClientId, DbError, DbResult, Request, RequestId};

use super::DatabaseHost;

impl DatabaseHost {
    /// Route a parsed request to its handler.
    pub(crate) fn dispatch(&self, client_id: ClientId, message_id: RequestId, request: Request) {
        match request {
            Request::CreateDatabase { name, options } => {
                self.create_database(client_id, message_id, name, options);
            }
            Request::Id => {
                let content = Value::String(client_id.clone());
                self.send_success(&client_id, &message_id, content);
            }
            Request::Destroy { options } => self.destroy_database(client_id, message_id, options),
            Request::LiveChanges { options } => self.live_changes(client_id, message_id, options),
            Request::CancelChanges => self.cancel_changes(&message_id),
            request => self.run_operation(client_id, message_id, request),
        }
    }

    /// Execute a database-bound request on its own task and emit the single
    /// terminal response. The registration check happens before anything is
    /// awaited, so an unknown client fails without touching the database.
    fn run_operation(&self, client_id: ClientId, message_id: RequestId, request: Request) {
        let Some(db) = self.database(&client_id) else {
            self.send_error(&client_id, &message_id, &DbError::db_not_found());
            return;
        };

        let host = self.clone();
        tokio::spawn(async move {
            match execute(db, request).await {
                Ok(content) => host.send_success(&client_id, &message_id, content),
                Err(error) => host.send_error(&client_id, &message_id, &error),
            }
        });
    }
}

async fn execute(db: Arc<dyn Database>, request: Request) -> DbResult<Value> {
    match request {
        Request::Info => db.info().await,
        Request::Put { doc, options } => db.put(doc, options).await,
        Request::Post { doc, options } => db.post(doc, options).await,
        Request::Get { doc_id, options } => db.get(&doc_id, options).await,
        Request::Remove { doc, options } => db.remove(doc, options).await,
        Request::AllDocs { options } => db.all_docs(options).await,
        Request::BulkDocs { docs, options } => db.bulk_docs(docs, options).await,
        Request::RevsDiff { revs } => db.revs_diff(revs).await,
        Request::Compact { options } => db.compact(options).await,
        Request::ViewCleanup => db.view_cleanup().await,
        Request::Query { view, options } => db.query(view, options).await,
        Request::PutAttachment {
            doc_id,
            attachment_id,
            rev,
            body,
            content_type,
        } => {
            db.put_attachment(&doc_id, &attachment_id, rev.as_deref(), body, &content_type)
                .await
        }
        Request::RemoveAttachment {
            doc_id,
            attachment_id,
            rev,
        } => db.remove_attachment(&doc_id, &attachment_id, &rev).await,
        Request::GetAttachment {
            doc_id,
            attachment_id,
            options,
        } => get_attachment(db.as_ref(), &doc_id, &attachment_id, options).await,
        Request::Changes { mut options } => {
            // the receiving side synthesizes change events from the full
            // document array, so the flag always wins over the caller
            options.return_docs = true;
            collect_changes(db.changes(options)).await
        }
        // createDatabase / id / liveChanges / cancelChanges / destroy are
        // routed before dispatch reaches here
        _ => Err(DbError::bad_request("operation is not a database call")),
    }
}

/// Fetch an attachment, first verifying against the parent document that
/// the attachment exists. A missing name fails with the stable
/// missing-document error before any attachment read happens.
async fn get_attachment(
    db: &dyn Database,
    doc_id: &str,
    attachment_id: &str,
    options: Value,
) -> DbResult<Value> {
    let doc = db.get(doc_id, options.clone()).await?;
    let present = doc
        .get("_attachments")
        .and_then(|attachments| attachments.get(attachment_id))
        .is_some();
    if !present {
        return Err(DbError::missing_doc());
    }
    db.get_attachment(doc_id, attachment_id, options).await
}

/// Drain a bulk (non-live) feed down to its terminal payload.
async fn collect_changes(mut feed: ChangesFeed) -> DbResult<Value> {
    while let Some(event) = feed.events.recv().await {
        match event {
            // the completion payload carries the full results array
            FeedEvent::Change(_) => {}
            FeedEvent::Complete(result) => return Ok(result),
            FeedEvent::Failed(error) => return Err(error),
        }
    }
    Err(DbError::new("Error", "changes feed closed unexpectedly"))
}
