//! Integration tests for change feeds: bulk reads and live
//! subscriptions with cancellation.

#[path = "../common/mod.rs"]
mod common;

use common::{envelope, recv_message, wait_until, Cluster, MemoryOpener};
use futures::StreamExt;
use serde_json::json;
use warren::config::HostSettings;
use warren::host::DatabaseHost;
use warren::protocol::OutboundMessage;

#[tokio::test]
async fn test_bulk_changes_returns_results() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    conn.put(json!({"_id": "a"})).await.unwrap();
    conn.put(json!({"_id": "b"})).await.unwrap();

    let changes = conn.changes(json!({})).await.unwrap();
    let results = changes["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], json!("a"));
    assert_eq!(results[1]["id"], json!("b"));
}

#[tokio::test]
async fn test_bulk_changes_forces_return_docs() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    // the caller explicitly opts out, and loses: the receiving side needs
    // the full document array to synthesize change events
    conn.changes(json!({"return_docs": false})).await.unwrap();
    let db = cluster.opener.database("foo").unwrap();
    assert!(db.last_changes_options().unwrap().return_docs);

    conn.changes(json!({"returnDocs": false})).await.unwrap();
    assert!(db.last_changes_options().unwrap().return_docs);
}

#[tokio::test]
async fn test_live_changes_streams_updates_then_one_terminal() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    let mut live = conn.live_changes(json!({"include_docs": true})).await.unwrap();
    let request_id = live.request_id().to_string();
    wait_until({
        let host = cluster.host.clone();
        let request_id = request_id.clone();
        move || host.has_subscription(&request_id)
    })
    .await;

    conn.put(json!({"_id": "a", "value": 1})).await.unwrap();
    conn.put(json!({"_id": "b", "value": 2})).await.unwrap();

    let first = live.next().await.unwrap();
    assert_eq!(first["id"], json!("a"));
    assert_eq!(first["doc"]["value"], json!(1));
    let second = live.next().await.unwrap();
    assert_eq!(second["id"], json!("b"));

    live.cancel();

    // cancellation surfaces through the normal terminal path
    let terminal = live.result().await.unwrap();
    assert_eq!(terminal["status"], json!("cancelled"));

    // the registration is gone once the terminal event is observed
    wait_until({
        let host = cluster.host.clone();
        move || !host.has_subscription(&request_id)
    })
    .await;
}

#[tokio::test]
async fn test_live_changes_no_updates_after_terminal() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    let mut live = conn.live_changes(json!({})).await.unwrap();
    let request_id = live.request_id().to_string();
    wait_until({
        let host = cluster.host.clone();
        let request_id = request_id.clone();
        move || host.has_subscription(&request_id)
    })
    .await;

    live.cancel();

    // drain: the stream must end, not yield more updates
    while live.next_update().await.is_some() {}

    // writes after the terminal never reach this subscription
    conn.put(json!({"_id": "late"})).await.unwrap();
    assert!(live.next_update().await.is_none());
}

#[tokio::test]
async fn test_live_changes_without_database_errors() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");

    let live = conn.live_changes(json!({})).await.unwrap();
    let error = live.result().await.unwrap_err();
    assert_eq!(error.to_string(), "not_found: db not found");
}

#[tokio::test]
async fn test_cancel_unknown_subscription_is_noop() {
    let opener = MemoryOpener::default();
    let (host, mut outbound) = DatabaseHost::new(opener, HostSettings::default());

    // nothing registered under this id; nothing is emitted either
    host.handle(envelope("cancelChanges", "client-1", "m1", vec![]));

    host.handle(envelope("id", "client-1", "m2", vec![]));
    match recv_message(&mut outbound).await {
        OutboundMessage::Success { message_id, .. } => assert_eq!(message_id, "m2"),
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn test_live_changes_reports_backlog_first() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();
    conn.put(json!({"_id": "existing"})).await.unwrap();

    let mut live = conn.live_changes(json!({})).await.unwrap();
    let first = live.next().await.unwrap();
    assert_eq!(first["id"], json!("existing"));

    live.cancel();
    live.result().await.unwrap();
}
