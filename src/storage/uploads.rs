//! Receipt object storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::models::{Upload, User};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Upload rejected (HTTP {status}): {message}")]
    Remote { status: u16, message: String },
    #[error("Upload failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::Transport(err.to_string())
    }
}

/// Stores a receipt file and returns a URL that can be fetched later.
#[async_trait]
pub trait ReceiptUploader: Send + Sync {
    async fn upload(&self, user: &User, upload: &Upload) -> Result<String, UploadError>;
}

/// Object name for a receipt: `receipts/{uid}/{millis}_{file name}`.
pub fn receipt_object_name(user: &User, millis: i64, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("receipts/{}/{}_{}", user.uid, millis, safe)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

/// Firebase Storage media upload.
pub struct FirebaseStorageUploader {
    http: Client,
    base_url: String,
    bucket: String,
    token: SecretString,
    clock: Arc<dyn Clock>,
}

impl FirebaseStorageUploader {
    /// `base_url` includes the API version, e.g.
    /// `https://firebasestorage.googleapis.com/v0`.
    pub fn new(base_url: &str, bucket: impl Into<String>, token: SecretString) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            token,
            clock: Arc::new(SystemClock::local()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn objects_url(&self) -> String {
        format!(
            "{}/b/{}/o",
            self.base_url,
            urlencoding::encode(&self.bucket)
        )
    }
}

#[async_trait]
impl ReceiptUploader for FirebaseStorageUploader {
    async fn upload(&self, user: &User, upload: &Upload) -> Result<String, UploadError> {
        let name = receipt_object_name(user, self.clock.now().timestamp_millis(), &upload.file_name);
        info!(user_id = %user.uid, object = %name, size = upload.len(), "Uploading receipt");

        let response = self
            .http
            .post(self.objects_url())
            .query(&[("uploadType", "media"), ("name", name.as_str())])
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, upload.content_type.as_str())
            .body(upload.bytes.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            warn!(status = %status, "Receipt upload rejected");
            return Err(UploadError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let meta: ObjectMetadata = response.json().await?;
        let token = meta
            .download_tokens
            .as_deref()
            .and_then(|t| t.split(',').next())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| UploadError::Remote {
                status: status.as_u16(),
                message: "response carried no download token".to_string(),
            })?;

        Ok(format!(
            "{}/{}?alt=media&token={}",
            self.objects_url(),
            urlencoding::encode(&meta.name),
            token
        ))
    }
}

/// Demo uploader keeping files in memory under `memory://` URLs.
pub struct MemoryUploader {
    objects: Mutex<HashMap<String, Upload>>,
    clock: Arc<dyn Clock>,
    fail_next: Mutex<Option<UploadError>>,
}

impl MemoryUploader {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            clock,
            fail_next: Mutex::new(None),
        }
    }

    /// Make the next upload fail with `err`.
    pub async fn fail_next(&self, err: UploadError) {
        *self.fail_next.lock().await = Some(err);
    }

    pub async fn get(&self, url: &str) -> Option<Upload> {
        self.objects.lock().await.get(url).cloned()
    }

    pub async fn stored_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

impl Default for MemoryUploader {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::local()))
    }
}

#[async_trait]
impl ReceiptUploader for MemoryUploader {
    async fn upload(&self, user: &User, upload: &Upload) -> Result<String, UploadError> {
        if let Some(err) = self.fail_next.lock().await.take() {
            return Err(err);
        }
        let name = receipt_object_name(user, self.clock.now().timestamp_millis(), &upload.file_name);
        let url = format!("memory://{name}");
        self.objects.lock().await.insert(url.clone(), upload.clone());
        info!(user_id = %user.uid, url = %url, "Receipt stored in memory");
        Ok(url)
    }
}
