//! Integration tests for attachment operations, including the
//! existence pre-check on reads.

#[path = "../common/mod.rs"]
mod common;

use common::Cluster;
use serde_json::json;
use warren::client::ClientError;

#[tokio::test]
async fn test_put_then_get_attachment() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    let put = conn
        .put_attachment("doc-a", "att-1", None, json!("aGVsbG8="), "text/plain")
        .await
        .unwrap();
    assert_eq!(put["ok"], json!(true));

    let body = conn
        .get_attachment("doc-a", "att-1", json!({}))
        .await
        .unwrap();
    assert_eq!(body, json!("aGVsbG8="));
}

#[tokio::test]
async fn test_get_attachment_missing_name_fails_before_read() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    // document exists but has no attachments map
    conn.put(json!({"_id": "doc-x", "value": 1})).await.unwrap();

    let error = conn
        .get_attachment("doc-x", "att-1", json!({}))
        .await
        .unwrap_err();
    match error {
        ClientError::Remote(remote) => {
            assert_eq!(remote.name, "not_found");
            assert_eq!(remote.message, "missing");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // the attachment read itself never ran
    let db = cluster.opener.database("foo").unwrap();
    assert_eq!(db.attachment_reads(), 0);
}

#[tokio::test]
async fn test_get_attachment_missing_document() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    let error = conn
        .get_attachment("nope", "att-1", json!({}))
        .await
        .unwrap_err();
    match error {
        ClientError::Remote(remote) => assert_eq!(remote.message, "missing"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_remove_attachment() {
    let cluster = Cluster::new();
    let conn = cluster.connection("client-1");
    conn.create_database(json!("foo")).await.unwrap();

    let put = conn
        .put_attachment("doc-a", "att-1", None, json!("aGVsbG8="), "text/plain")
        .await
        .unwrap();
    let rev = put["rev"].as_str().unwrap().to_string();

    conn.remove_attachment("doc-a", "att-1", &rev).await.unwrap();

    let error = conn
        .get_attachment("doc-a", "att-1", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::Remote(remote) if remote.message == "missing"));
}
