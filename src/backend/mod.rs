//! Database collaborator interface.
//!
//! The host never implements storage itself; it drives any engine that
//! satisfies [`Database`], produced by a pluggable [`DatabaseOpener`]. All
//! operations resolve asynchronously with an explicit [`DbResult`];
//! attachment payloads travel as already-encoded JSON values (binary
//! serialization is the transport layer's concern).

mod changes;

pub use changes::{CancelHandle, ChangesFeed, ChangesOptions, FeedEvent};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::protocol::{DbError, DbResult};

/// Stream of asynchronous failures raised by a database handle outside the
/// context of any specific request.
pub type UncaughtErrors = mpsc::UnboundedReceiver<DbError>;

/// One database instance owned by the registry on behalf of a client.
///
/// Documents returned by [`get`](Database::get) carry their attachments
/// under an `_attachments` map keyed by attachment name.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn info(&self) -> DbResult<Value>;

    async fn put(&self, doc: Value, options: Value) -> DbResult<Value>;

    async fn post(&self, doc: Value, options: Value) -> DbResult<Value>;

    async fn get(&self, doc_id: &str, options: Value) -> DbResult<Value>;

    async fn remove(&self, doc: Value, options: Value) -> DbResult<Value>;

    async fn all_docs(&self, options: Value) -> DbResult<Value>;

    async fn bulk_docs(&self, docs: Vec<Value>, options: Value) -> DbResult<Value>;

    async fn revs_diff(&self, revs: Value) -> DbResult<Value>;

    async fn compact(&self, options: Value) -> DbResult<Value>;

    async fn view_cleanup(&self) -> DbResult<Value>;

    async fn query(&self, view: Value, options: Value) -> DbResult<Value>;

    async fn get_attachment(
        &self,
        doc_id: &str,
        attachment_id: &str,
        options: Value,
    ) -> DbResult<Value>;

    async fn put_attachment(
        &self,
        doc_id: &str,
        attachment_id: &str,
        rev: Option<&str>,
        body: Value,
        content_type: &str,
    ) -> DbResult<Value>;

    async fn remove_attachment(
        &self,
        doc_id: &str,
        attachment_id: &str,
        rev: &str,
    ) -> DbResult<Value>;

    /// Open a change feed. The returned feed emits zero or more changes and
    /// then exactly one terminal event; see [`ChangesFeed`].
    fn changes(&self, options: ChangesOptions) -> ChangesFeed;

    /// Subscribe to failures raised outside any request. The host relays
    /// these to the controller as `uncaughtError` broadcasts.
    fn subscribe_errors(&self) -> DbResult<UncaughtErrors>;

    /// Tear the database down. The registry entry is already gone by the
    /// time this runs.
    async fn destroy(&self, options: Value) -> DbResult<Value>;
}

/// Factory producing database handles.
///
/// Invoked synchronously during `createDatabase`; the handle is registered
/// before any asynchronous confirmation happens.
pub trait DatabaseOpener: Send + Sync + 'static {
    fn open(&self, name: &str, options: &Value) -> Arc<dyn Database>;
}

impl<F> DatabaseOpener for F
where
    F: Fn(&str, &Value) -> Arc<dyn Database> + Send + Sync + 'static,
{
    fn open(&self, name: &str, options: &Value) -> Arc<dyn Database> {
        self(name, options)
    }
}
