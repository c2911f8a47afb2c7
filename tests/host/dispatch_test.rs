//! Integration tests for operation dispatch: pass-through operations,
//! response correlation, and client isolation.

#[path = "../common/mod.rs"]
mod common;

use std::collections::HashSet;

use common::{envelope, recv_message, Cluster, MemoryOpener};
use serde_json::json;
use warren::client::ClientError;
use warren::config::HostSettings;
use warren::host::DatabaseHost;
use warren::protocol::OutboundMessage;

#[tokio::test]
async fn test_create_put_get_destroy_scenario() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");

    let created = conn.create_database(json!("foo")).await.unwrap();
    assert_eq!(created, json!({"ok": true}));

    let put = conn.put(json!({"_id": "a", "value": 1})).await.unwrap();
    assert_eq!(put["ok"], json!(true));
    assert!(put["rev"].as_str().is_some());

    let doc = conn.get("a").await.unwrap();
    assert_eq!(doc["_id"], json!("a"));
    assert_eq!(doc["value"], json!(1));

    let destroyed = conn.destroy().await.unwrap();
    assert_eq!(destroyed["ok"], json!(true));

    // the registration is gone; the same client id now fails
    let error = conn.put(json!({"_id": "b"})).await.unwrap_err();
    match error {
        ClientError::Remote(remote) => assert_eq!(remote.message, "db not found"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_pass_through_operations() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    conn.put(json!({"_id": "a", "value": 1})).await.unwrap();
    conn.put(json!({"_id": "b", "value": 2})).await.unwrap();

    let info = conn.info().await.unwrap();
    assert_eq!(info["db_name"], json!("foo"));
    assert_eq!(info["doc_count"], json!(2));

    let all = conn.all_docs(json!({})).await.unwrap();
    assert_eq!(all["total_rows"], json!(2));

    let bulk = conn
        .bulk_docs(json!([{"_id": "c"}, {"_id": "d"}]), json!({}))
        .await
        .unwrap();
    assert_eq!(bulk.as_array().unwrap().len(), 2);

    assert_eq!(conn.compact().await.unwrap()["ok"], json!(true));
    assert_eq!(conn.view_cleanup().await.unwrap()["ok"], json!(true));
    assert_eq!(conn.revs_diff(json!({})).await.unwrap(), json!({}));

    let rows = conn.query(json!("app/by_value"), json!({})).await.unwrap();
    assert_eq!(rows["rows"], json!([]));

    let echoed = conn.id().await.unwrap();
    assert_eq!(echoed, json!("client-1"));
}

#[tokio::test]
async fn test_conflicting_put_surfaces_remote_error() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    conn.put(json!({"_id": "a"})).await.unwrap();
    let error = conn.put(json!({"_id": "a"})).await.unwrap_err();
    match error {
        ClientError::Remote(remote) => {
            assert_eq!(remote.name, "conflict");
            assert_eq!(remote.status, Some(409));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_arguments_report_error() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    // get with a non-string id fails validation at the boundary
    let error = conn
        .request("get", vec![json!(42)])
        .await
        .unwrap_err();
    match error {
        ClientError::Remote(remote) => assert_eq!(remote.name, "bad_request"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_requests_each_get_exactly_one_response() {
    let opener = MemoryOpener::default();
    let (host, mut outbound) = DatabaseHost::new(opener.clone(), HostSettings::default());

    host.handle(envelope("createDatabase", "client-1", "m0", vec![json!("foo")]));
    recv_message(&mut outbound).await;

    let total = 16;
    for n in 0..total {
        host.handle(envelope(
            "put",
            "client-1",
            &format!("m{n}"),
            vec![json!({"_id": format!("doc-{n}")})],
        ));
    }

    // responses arrive in completion order, not issue order; every request
    // id shows up exactly once
    let mut seen = HashSet::new();
    for _ in 0..total {
        match recv_message(&mut outbound).await {
            OutboundMessage::Success { message_id, .. } => {
                assert!(seen.insert(message_id), "duplicate terminal response");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    let expected: HashSet<String> = (0..total).map(|n| format!("m{n}")).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_interleaved_clients_are_isolated() {
    let cluster = Cluster::new();
    let alice = cluster.connection("client-a");
    let bob = cluster.connection("client-b");

    alice.create_database(json!("alice-db")).await.unwrap();
    bob.create_database(json!("bob-db")).await.unwrap();

    let (a, b) = tokio::join!(
        alice.put(json!({"_id": "shared-id", "owner": "alice"})),
        bob.put(json!({"_id": "shared-id", "owner": "bob"}))
    );
    a.unwrap();
    b.unwrap();

    let doc = alice.get("shared-id").await.unwrap();
    assert_eq!(doc["owner"], json!("alice"));
    let doc = bob.get("shared-id").await.unwrap();
    assert_eq!(doc["owner"], json!("bob"));

    // two independent handles exist
    assert_eq!(cluster.opener.opened().len(), 2);
}

#[tokio::test]
async fn test_uncaught_error_broadcast() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    let mut uncaught = conn.uncaught_errors().await.unwrap();

    let db = cluster.opener.database("foo").unwrap();
    db.inject_uncaught(warren::protocol::DbError::new("Error", "disk fell off"));

    let error = tokio::time::timeout(std::time::Duration::from_secs(2), uncaught.recv())
        .await
        .expect("timed out waiting for uncaught error")
        .expect("uncaught channel closed");
    assert_eq!(error.message, "disk fell off");
}
