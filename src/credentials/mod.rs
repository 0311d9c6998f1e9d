//! Credential storage abstraction.
//!
//! Service credentials (backend web API key, AI API key) are looked up by a
//! logical key name. The only production backend reads environment
//! variables; an in-memory store backs tests and embedding applications.

mod env;

pub use env::EnvCredentialStore;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

/// A key-value store for credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or is blank.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;

    /// Store a credential.
    async fn set(&self, key: &str, value: SecretString) -> Result<()>;

    /// Check if this store supports writes.
    fn supports_write(&self) -> bool {
        true
    }
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: Mutex::new(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let values = self.values.lock().await;
        Ok(values
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::new(v.clone().into())))
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value.expose_secret().to_string());
        Ok(())
    }
}
