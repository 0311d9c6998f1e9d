//! Remote store backed by the Firestore REST API.
//!
//! Transactions live in `users/{uid}/transactions`. The live view is a
//! polling task that re-runs the ordered query every `poll_interval` and
//! immediately after each write made through this store.

mod document;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::models::{DocumentIdGenerator, Id, IdGenerator, NewTransaction, Transaction, User};

use self::document::{
    parse_timestamp, profile_fields, transaction_fields, transaction_from_document,
    user_from_fields, Document, Fields, QueryRow,
};
use super::{validate_batch, Snapshot, StoreError, Subscription, TransactionStore};

const TRANSACTIONS: &str = "transactions";

/// Stored user profile (`users/{uid}`).
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user: User,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    write_results: Vec<WriteResult>,
    #[serde(default)]
    commit_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResult {
    #[serde(default)]
    transform_results: Vec<Value>,
}

/// Map a failed response to a store error, keeping the service's message.
async fn status_error(response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => StoreError::Unauthenticated,
        StatusCode::FORBIDDEN => StoreError::PermissionDenied,
        StatusCode::NOT_FOUND => StoreError::NotFound,
        _ => {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            StoreError::Remote {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// HTTP access shared with the polling tasks.
struct FirestoreClient {
    http: Client,
    /// `{base}/projects/{project}/databases/(default)/documents`
    documents_url: String,
    /// `projects/{project}/databases/(default)/documents`
    documents_path: String,
    token: SecretString,
}

impl FirestoreClient {
    /// Resource path of the user document, as used inside request bodies.
    fn user_path(&self, uid: &str) -> String {
        format!("users/{uid}")
    }

    /// Same path, percent-encoded for request URLs.
    fn user_url_path(&self, uid: &str) -> String {
        format!("users/{}", urlencoding::encode(uid))
    }

    fn document_name(&self, relative: &str) -> String {
        format!("{}/{}", self.documents_path, relative)
    }

    async fn list(&self, uid: &str) -> Result<Vec<Transaction>, StoreError> {
        let url = format!("{}/{}:runQuery", self.documents_url, self.user_url_path(uid));
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": TRANSACTIONS }],
                "orderBy": [{ "field": { "fieldPath": "date" }, "direction": "DESCENDING" }]
            }
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let rows: Vec<QueryRow> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let mut transactions = Vec::with_capacity(rows.len());
        for doc in rows.iter().filter_map(|row| row.document.as_ref()) {
            match transaction_from_document(doc) {
                Ok(txn) => transactions.push(txn),
                Err(reason) => {
                    warn!(document = %doc.name, reason = %reason, "Skipping unreadable transaction");
                }
            }
        }
        Ok(transactions)
    }

    /// Atomic multi-write: every document must not exist yet, and each gets
    /// a server-side `createdAt`.
    async fn commit(&self, documents: Vec<(String, Fields)>) -> Result<CommitResponse, StoreError> {
        let writes: Vec<Value> = documents
            .into_iter()
            .map(|(name, fields)| {
                json!({
                    "update": { "name": name, "fields": fields },
                    "currentDocument": { "exists": false },
                    "updateTransforms": [
                        { "fieldPath": "createdAt", "setToServerValue": "REQUEST_TIME" }
                    ]
                })
            })
            .collect();

        let response = self
            .http
            .post(format!("{}:commit", self.documents_url))
            .bearer_auth(self.token.expose_secret())
            .json(&json!({ "writes": writes }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn delete(&self, uid: &str, id: &Id) -> Result<(), StoreError> {
        let url = format!(
            "{}/{}/{}/{}?currentDocument.exists=true",
            self.documents_url,
            self.user_url_path(uid),
            TRANSACTIONS,
            urlencoding::encode(id.as_str())
        );
        let response = self
            .http
            .delete(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn get_document(&self, relative: &str) -> Result<Option<Document>, StoreError> {
        let response = self
            .http
            .get(format!("{}/{}", self.documents_url, relative))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Firestore-backed [`TransactionStore`] for one signed-in session.
pub struct FirestoreStore {
    client: Arc<FirestoreClient>,
    ids: Arc<dyn IdGenerator>,
    poll_interval: Duration,
    /// Refresh handles of open subscriptions, per user.
    listeners: Mutex<HashMap<String, Vec<Weak<Notify>>>>,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("documents_url", &self.client.documents_url)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl FirestoreStore {
    /// `base_url` includes the API version, e.g.
    /// `https://firestore.googleapis.com/v1`.
    pub fn new(base_url: &str, project_id: &str, token: SecretString) -> Self {
        let base = base_url.trim_end_matches('/');
        let documents_path = format!("projects/{project_id}/databases/(default)/documents");
        Self {
            client: Arc::new(FirestoreClient {
                http: Client::new(),
                documents_url: format!("{base}/{documents_path}"),
                documents_path,
                token,
            }),
            ids: Arc::new(DocumentIdGenerator),
            poll_interval: BackendConfig::default().poll_interval,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &BackendConfig, project_id: &str, token: SecretString) -> Self {
        Self::new(&config.firestore_url, project_id, token).with_poll_interval(config.poll_interval)
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wake every open subscription of `uid` so it re-reads now.
    async fn notify_listeners(&self, uid: &str) {
        let mut listeners = self.listeners.lock().await;
        if let Some(handles) = listeners.get_mut(uid) {
            handles.retain(|weak| match weak.upgrade() {
                Some(notify) => {
                    notify.notify_one();
                    true
                }
                None => false,
            });
        }
    }

    fn new_document(&self, uid: &str, new: &NewTransaction) -> (Id, String, Fields) {
        let id = self.ids.new_id();
        let relative = format!(
            "{}/{}/{}",
            self.client.user_path(uid),
            TRANSACTIONS,
            id.as_str()
        );
        (
            id,
            self.client.document_name(&relative),
            transaction_fields(new),
        )
    }

    pub async fn get_profile(&self, uid: &str) -> Result<Option<Profile>, StoreError> {
        let doc = self.client.get_document(&self.client.user_url_path(uid)).await?;
        Ok(doc.map(|d| Profile {
            user: user_from_fields(uid, &d.fields),
        }))
    }

    /// Write the profile document; fails if it already exists.
    pub async fn create_profile(&self, user: &User) -> Result<(), StoreError> {
        let name = self.client.document_name(&self.client.user_path(&user.uid));
        self.client
            .commit(vec![(name, profile_fields(user))])
            .await?;
        info!(user_id = %user.uid, "User profile created");
        Ok(())
    }

    /// Create the profile on first sign-in; existing profiles are left alone.
    pub async fn ensure_profile(&self, user: &User) -> Result<(), StoreError> {
        if self.get_profile(&user.uid).await?.is_none() {
            self.create_profile(user).await?;
        }
        Ok(())
    }
}

fn commit_created_at(
    response: &CommitResponse,
    index: usize,
) -> Option<chrono::DateTime<chrono::Utc>> {
    response
        .write_results
        .get(index)
        .and_then(|w| w.transform_results.first())
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .or_else(|| response.commit_time.as_deref().and_then(parse_timestamp))
}

#[async_trait]
impl TransactionStore for FirestoreStore {
    async fn subscribe(&self, user: &User) -> Result<Subscription, StoreError> {
        let (tx, rx) = watch::channel(Snapshot::Loading);
        let refresh = Arc::new(Notify::new());
        self.listeners
            .lock()
            .await
            .entry(user.uid.clone())
            .or_default()
            .push(Arc::downgrade(&refresh));

        let client = Arc::clone(&self.client);
        let uid = user.uid.clone();
        let interval = self.poll_interval;
        let task = tokio::spawn(async move {
            loop {
                let snapshot = match client.list(&uid).await {
                    Ok(list) => Snapshot::ready(list),
                    Err(err) => {
                        warn!(user_id = %uid, error = %err, "Live query failed");
                        Snapshot::Failed(err)
                    }
                };
                tx.send_if_modified(|current| {
                    if *current == snapshot {
                        false
                    } else {
                        *current = snapshot;
                        true
                    }
                });
                if tx.is_closed() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = refresh.notified() => {}
                }
            }
            debug!(user_id = %uid, "Live query stopped");
        });

        info!(user_id = %user.uid, interval_secs = interval.as_secs(), "Live query opened");
        Ok(Subscription::with_task(
            rx,
            format!("firestore:{}", user.uid),
            task,
        ))
    }

    async fn add(&self, user: &User, new: NewTransaction) -> Result<Transaction, StoreError> {
        new.validate()?;
        let (id, name, fields) = self.new_document(&user.uid, &new);
        let response = self.client.commit(vec![(name, fields)]).await?;
        let created_at = commit_created_at(&response, 0).ok_or_else(|| {
            StoreError::Decode("commit response carried no timestamp".to_string())
        })?;

        info!(user_id = %user.uid, id = %id, "Transaction added");
        self.notify_listeners(&user.uid).await;
        Ok(Transaction::from_new(new, id, created_at))
    }

    async fn delete(&self, user: &User, id: &Id) -> Result<(), StoreError> {
        if !Id::is_segment_safe(id.as_str()) {
            return Err(StoreError::NotFound);
        }
        self.client.delete(&user.uid, id).await?;
        info!(user_id = %user.uid, id = %id, "Transaction deleted");
        self.notify_listeners(&user.uid).await;
        Ok(())
    }

    async fn add_batch(
        &self,
        user: &User,
        batch: Vec<NewTransaction>,
    ) -> Result<Vec<Transaction>, StoreError> {
        validate_batch(&batch)?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(batch.len());
        let mut documents = Vec::with_capacity(batch.len());
        for new in &batch {
            let (id, name, fields) = self.new_document(&user.uid, new);
            ids.push(id);
            documents.push((name, fields));
        }

        let response = self.client.commit(documents).await?;
        let created: Vec<Transaction> = batch
            .into_iter()
            .zip(ids)
            .enumerate()
            .map(|(index, (new, id))| {
                let created_at = commit_created_at(&response, index).ok_or_else(|| {
                    StoreError::Decode("commit response carried no timestamp".to_string())
                })?;
                Ok(Transaction::from_new(new, id, created_at))
            })
            .collect::<Result<_, StoreError>>()?;

        info!(user_id = %user.uid, count = created.len(), "Transaction batch committed");
        self.notify_listeners(&user.uid).await;
        Ok(created)
    }

    fn name(&self) -> &str {
        "firestore"
    }
}
