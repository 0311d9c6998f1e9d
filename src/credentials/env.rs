//! Environment-variable credential backend.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

use super::CredentialStore;

/// Reads credentials from process environment variables.
///
/// An optional prefix is prepended to every key, so `EnvCredentialStore::with_prefix("HARCAMA_")`
/// resolves `GEMINI_API_KEY` from `HARCAMA_GEMINI_API_KEY` first and then from
/// the bare name.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore {
    prefix: Option<String>,
}

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let prefixed = self
            .prefix
            .as_ref()
            .and_then(|p| std::env::var(format!("{p}{key}")).ok());
        prefixed
            .or_else(|| std::env::var(key).ok())
            .filter(|v| !v.trim().is_empty())
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(self.lookup(key).map(|v| SecretString::new(v.into())))
    }

    async fn set(&self, key: &str, _value: SecretString) -> Result<()> {
        anyhow::bail!("Environment credentials are read-only (cannot set {key})")
    }

    fn supports_write(&self) -> bool {
        false
    }
}
