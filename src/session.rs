//! Application wiring: chooses demo or hosted collaborators for the current
//! session.

use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::ai::{DemoAnalyzer, GeminiClient, ReceiptAnalyzer};
use crate::auth::{AuthContext, FirebaseIdentity, IdentityProvider, Session, SessionMode};
use crate::clock::Clock;
use crate::compress::CompressionSettings;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::dashboard::Dashboard;
use crate::ingest::FlowContext;
use crate::storage::{
    FirebaseStorageUploader, FirestoreStore, MemoryStore, MemoryUploader, ReceiptUploader,
    TransactionStore,
};

/// Everything a signed-in view needs.
#[derive(Clone)]
pub struct Collaborators {
    pub session: Session,
    pub store: Arc<dyn TransactionStore>,
    pub uploader: Arc<dyn ReceiptUploader>,
    pub analyzer: Arc<dyn ReceiptAnalyzer>,
}

/// Hosted store shared by every view of one session, so writes made through
/// a flow wake the dashboard's live view.
struct RemoteCache {
    generation: u64,
    store: Arc<FirestoreStore>,
}

pub struct AppSession {
    config: Config,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    auth: AuthContext,
    demo_store: Arc<MemoryStore>,
    demo_uploader: Arc<MemoryUploader>,
    remote: Mutex<Option<RemoteCache>>,
}

impl AppSession {
    /// Hosted sign-in is offered only when the backend API key is present.
    pub async fn new(config: Config, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(config.clock()?);
        let api_key = credentials
            .get(&config.backend.api_key_env)
            .await
            .with_context(|| format!("Failed to read {}", config.backend.api_key_env))?;
        let provider = api_key.map(|key| {
            Arc::new(FirebaseIdentity::new(key).with_base_url(config.backend.identity_url.clone()))
                as Arc<dyn IdentityProvider>
        });
        if provider.is_none() {
            debug!(
                key = %config.backend.api_key_env,
                "Backend API key not set; only demo mode is available"
            );
        }
        Ok(Self::with_parts(config, credentials, clock, provider))
    }

    pub fn with_parts(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            demo_store: Arc::new(MemoryStore::with_demo_seed(clock.clone())),
            demo_uploader: Arc::new(MemoryUploader::new(clock.clone())),
            auth: AuthContext::new(provider),
            remote: Mutex::new(None),
            config,
            credentials,
            clock,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn login_demo(&self) -> Session {
        self.auth.login_demo()
    }

    /// Sign in against the hosted backend and make sure the user has a
    /// profile document. A failed profile write is logged, not fatal.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<Session> {
        let session = self.auth.login(email, password).await?;
        match self.remote_store(&session).await {
            Ok(store) => {
                if let Err(err) = store.ensure_profile(&session.user).await {
                    warn!(user_id = %session.user.uid, error = %err, "Could not create user profile");
                }
            }
            Err(err) => warn!(error = %err, "Hosted store is not configured"),
        }
        Ok(session)
    }

    pub async fn logout(&self) -> Result<()> {
        self.auth.logout().await?;
        self.remote.lock().await.take();
        Ok(())
    }

    fn token(session: &Session) -> Option<SecretString> {
        match &session.mode {
            SessionMode::Demo => None,
            SessionMode::Remote { token } => {
                Some(SecretString::new(token.expose_secret().into()))
            }
        }
    }

    async fn remote_store(&self, session: &Session) -> Result<Arc<FirestoreStore>> {
        let mut cache = self.remote.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.generation == session.generation) {
            return Ok(cached.store.clone());
        }
        let project_id = self
            .config
            .backend
            .project_id
            .as_deref()
            .context("backend.project_id is not set")?;
        let token = Self::token(session).context("Session has no access token")?;
        let store = Arc::new(FirestoreStore::from_config(
            &self.config.backend,
            project_id,
            token,
        ));
        *cache = Some(RemoteCache {
            generation: session.generation,
            store: store.clone(),
        });
        Ok(store)
    }

    fn current_session(&self) -> Result<Session> {
        self.auth
            .session()
            .context("Not signed in; log in or use demo mode")
    }

    /// Demo sessions get the seeded memory store and the canned analyzer;
    /// hosted sessions get the document store, object storage and Gemini.
    pub async fn collaborators(&self) -> Result<Collaborators> {
        let session = self.current_session()?;
        if session.is_demo() {
            return Ok(Collaborators {
                store: self.demo_store.clone(),
                uploader: self.demo_uploader.clone(),
                analyzer: Arc::new(DemoAnalyzer::new(self.clock.clone())),
                session,
            });
        }

        let store = self.remote_store(&session).await?;
        let bucket = self
            .config
            .backend
            .storage_bucket
            .as_deref()
            .context("backend.storage_bucket is not set")?;
        let token = Self::token(&session).context("Session has no access token")?;
        let uploader = FirebaseStorageUploader::new(&self.config.backend.storage_url, bucket, token)
            .with_clock(self.clock.clone());
        let ai_key = self
            .credentials
            .get(&self.config.ai.api_key_env)
            .await
            .with_context(|| format!("Failed to read {}", self.config.ai.api_key_env))?;
        let analyzer = GeminiClient::from_config(&self.config.ai, ai_key);

        Ok(Collaborators {
            store,
            uploader: Arc::new(uploader),
            analyzer: Arc::new(analyzer),
            session,
        })
    }

    pub async fn flow_context(&self) -> Result<FlowContext> {
        let parts = self.collaborators().await?;
        let compression = self
            .config
            .receipts
            .compress
            .then(|| CompressionSettings::from(&self.config.receipts));
        Ok(FlowContext {
            user: parts.session.user,
            analyzer: parts.analyzer,
            uploader: parts.uploader,
            store: parts.store,
            clock: self.clock.clone(),
            compression,
        })
    }

    pub async fn open_dashboard(&self) -> Result<Dashboard> {
        let parts = self.collaborators().await?;
        Ok(Dashboard::open(parts.store, &parts.session, self.auth.watch()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::credentials::MemoryCredentialStore;
    use crate::dashboard::DashboardState;
    use crate::ingest::SingleEntryFlow;
    use crate::models::Upload;
    use rust_decimal::Decimal;

    fn demo_app() -> AppSession {
        AppSession::with_parts(
            Config::default(),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(FixedClock::on_date(2026, 10, 18)),
            None,
        )
    }

    #[tokio::test]
    async fn no_api_key_means_demo_only() {
        let app = AppSession::new(Config::default(), Arc::new(MemoryCredentialStore::new()))
            .await
            .unwrap();
        assert!(!app.auth().has_provider());
        let password = SecretString::new("x".to_string().into());
        let err = app.login("a@b.c", &password).await.unwrap_err();
        assert!(err.to_string().contains("demo mode"));
    }

    #[tokio::test]
    async fn views_require_a_session() {
        let app = demo_app();
        assert!(app.open_dashboard().await.is_err());
        assert!(app.flow_context().await.is_err());
    }

    #[tokio::test]
    async fn demo_flow_writes_show_on_dashboard() {
        let app = demo_app();
        app.login_demo();
        let mut dashboard = app.open_dashboard().await.unwrap();
        dashboard.load().await;
        assert_eq!(dashboard.transactions().len(), 3);

        let mut flow = SingleEntryFlow::new(app.flow_context().await.unwrap());
        flow.scan(Upload::new("fis.pdf", "application/pdf", b"%PDF".to_vec()))
            .await
            .unwrap();
        assert_eq!(flow.form().title.value(), "Starbucks Coffee");
        flow.submit().await.unwrap();

        dashboard.refresh().await;
        assert!(matches!(dashboard.state(), DashboardState::Ready(_)));
        assert_eq!(dashboard.transactions().len(), 4);
        assert_eq!(dashboard.totals().expense, Decimal::new(14899, 2));
    }

    #[tokio::test]
    async fn hosted_session_needs_project_id() {
        let app = demo_app();
        let session = Session {
            user: crate::models::User::new("u1"),
            mode: SessionMode::Remote {
                token: Arc::new(SecretString::new("t".to_string().into())),
            },
            generation: 1,
        };
        let err = app.remote_store(&session).await.unwrap_err();
        assert!(err.to_string().contains("project_id"));
    }
}
