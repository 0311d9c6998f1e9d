use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use harcama::models::{FixedIdGenerator, Id, NewTransaction, TransactionType, User};
use harcama::storage::{FirestoreStore, Snapshot, StoreError, TransactionStore};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOCS: &str = "/v1/projects/test-project/databases/(default)/documents";

fn store(server: &MockServer) -> FirestoreStore {
    FirestoreStore::new(
        &format!("{}/v1", server.uri()),
        "test-project",
        SecretString::new("id-token".into()),
    )
    .with_poll_interval(Duration::from_secs(3600))
}

fn row(id: &str, title: &str, amount: f64, kind: &str, date: &str, created: &str) -> serde_json::Value {
    json!({
        "document": {
            "name": format!("projects/test-project/databases/(default)/documents/users/u1/transactions/{id}"),
            "fields": {
                "title": { "stringValue": title },
                "amount": { "doubleValue": amount },
                "type": { "stringValue": kind },
                "category": { "stringValue": "food" },
                "date": { "stringValue": date },
                "createdAt": { "timestampValue": created },
                "receiptUrl": { "nullValue": null }
            },
            "createTime": created
        },
        "readTime": "2026-10-18T12:00:00Z"
    })
}

fn kira() -> NewTransaction {
    NewTransaction::new(
        "Kira",
        Decimal::new(1500000, 2),
        TransactionType::Expense,
        "bills",
        NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
    )
}

#[tokio::test]
async fn live_view_lists_sorted_and_skips_bad_documents() -> Result<()> {
    let server = MockServer::start().await;
    let rows = json!([
        row("a", "Simit", 15.0, "expense", "2026-10-16", "2026-10-16T08:00:00Z"),
        row("b", "Maaş", 42000.0, "income", "2026-10-17", "2026-10-17T09:00:00Z"),
        { "document": {
            "name": "projects/test-project/databases/(default)/documents/users/u1/transactions/bad",
            "fields": { "title": { "stringValue": "no amount" }, "date": { "stringValue": "2026-10-18" } }
        }},
        { "readTime": "2026-10-18T12:00:00Z" }
    ]);
    Mock::given(method("POST"))
        .and(path_regex(r"/users/u1:runQuery$"))
        .and(header("authorization", "Bearer id-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(&server)
        .await;

    let store = store(&server);
    let mut sub = store.subscribe(&User::new("u1")).await?;
    let list = sub.wait_ready().await?;
    let titles: Vec<_> = list.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Maaş", "Simit"]);
    assert_eq!(list[0].amount, Decimal::new(42000, 0));
    assert_eq!(list[1].id, Id::from("a"));

    let requests = server.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(
        body["structuredQuery"]["orderBy"][0]["direction"],
        "DESCENDING"
    );
    Ok(())
}

#[tokio::test]
async fn permission_denied_is_reported_not_loading() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r":runQuery$"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED" }
        })))
        .mount(&server)
        .await;

    let store = store(&server);
    let mut sub = store.subscribe(&User::new("u1")).await?;
    let err = sub.wait_ready().await.unwrap_err();
    assert_eq!(err, StoreError::PermissionDenied);
    assert!(matches!(sub.current(), Snapshot::Failed(_)));
    Ok(())
}

#[tokio::test]
async fn add_commits_with_server_timestamp() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:commit")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "writeResults": [{
                "updateTime": "2026-10-18T10:00:00.5Z",
                "transformResults": [{ "timestampValue": "2026-10-18T10:00:00.123Z" }]
            }],
            "commitTime": "2026-10-18T10:00:00.5Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server).with_id_generator(std::sync::Arc::new(FixedIdGenerator::new([
        Id::from("fixed-1"),
    ])));
    let txn = store.add(&User::new("u1"), kira()).await?;
    assert_eq!(txn.id, Id::from("fixed-1"));
    assert_eq!(txn.created_at.to_rfc3339(), "2026-10-18T10:00:00.123+00:00");

    let requests = server.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    let write = &body["writes"][0];
    assert_eq!(
        write["update"]["name"],
        "projects/test-project/databases/(default)/documents/users/u1/transactions/fixed-1"
    );
    assert_eq!(write["update"]["fields"]["amount"]["doubleValue"], 15000.0);
    assert_eq!(write["update"]["fields"]["type"]["stringValue"], "expense");
    assert_eq!(write["currentDocument"]["exists"], false);
    assert_eq!(write["updateTransforms"][0]["fieldPath"], "createdAt");
    Ok(())
}

#[tokio::test]
async fn batch_is_one_commit() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:commit")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "writeResults": [{}, {}],
            "commitTime": "2026-10-18T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = store(&server)
        .add_batch(&User::new("u1"), vec![kira(), kira()])
        .await?;
    assert_eq!(created.len(), 2);
    assert_ne!(created[0].id, created[1].id);

    let requests = server.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(body["writes"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn failed_batch_reports_the_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:commit")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": { "code": 409, "message": "Document already exists", "status": "ALREADY_EXISTS" }
        })))
        .mount(&server)
        .await;

    let err = store(&server)
        .add_batch(&User::new("u1"), vec![kira(), kira()])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::Remote {
            status: 409,
            message: "Document already exists".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn invalid_batch_is_rejected_before_any_request() -> Result<()> {
    let server = MockServer::start().await;
    let mut bad = kira();
    bad.title = "  ".to_string();

    let err = store(&server)
        .add_batch(&User::new("u1"), vec![kira(), bad])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(ref m) if m.starts_with("entry 2")));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_requires_existing_document() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{DOCS}/users/u1/transactions/t-1")))
        .and(query_param("currentDocument.exists", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{DOCS}/users/u1/transactions/t-2")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "denied", "status": "PERMISSION_DENIED" }
        })))
        .mount(&server)
        .await;

    let store = store(&server);
    let user = User::new("u1");
    store.delete(&user, &Id::from("t-1")).await?;
    assert_eq!(
        store.delete(&user, &Id::from("t-2")).await.unwrap_err(),
        StoreError::PermissionDenied
    );
    assert_eq!(
        store.delete(&user, &Id::from("../escape")).await.unwrap_err(),
        StoreError::NotFound
    );
    Ok(())
}

#[tokio::test]
async fn writes_wake_the_live_view() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r":runQuery$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row("a", "Simit", 15.0, "expense", "2026-10-16", "2026-10-16T08:00:00Z")
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r":runQuery$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row("a", "Simit", 15.0, "expense", "2026-10-16", "2026-10-16T08:00:00Z"),
            row("fixed-1", "Kira", 15000.0, "expense", "2026-10-01", "2026-10-18T10:00:00Z")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:commit")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "writeResults": [{ "transformResults": [{ "timestampValue": "2026-10-18T10:00:00Z" }] }]
        })))
        .mount(&server)
        .await;

    let store = store(&server).with_id_generator(std::sync::Arc::new(FixedIdGenerator::new([
        Id::from("fixed-1"),
    ])));
    let user = User::new("u1");
    let mut sub = store.subscribe(&user).await?;
    assert_eq!(sub.wait_ready().await?.len(), 1);

    store.add(&user, kira()).await?;
    let next = tokio::time::timeout(Duration::from_secs(5), sub.wait_ready()).await??;
    assert_eq!(next.len(), 2);
    assert_eq!(next[1].title, "Kira");
    Ok(())
}
