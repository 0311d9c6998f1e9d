//! Authentication context.
//!
//! Tracks who is signed in and whether the session talks to the hosted
//! backend or runs in demo mode. Changes are broadcast through a
//! `tokio::sync::watch` channel so views can drop data that belonged to a
//! previous user.

mod firebase;

pub use firebase::FirebaseIdentity;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::info;

use crate::models::User;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("No identity provider is configured; use demo mode")]
    NotConfigured,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Identity service error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },
    #[error("Identity service unreachable: {0}")]
    Transport(String),
}

/// Result of a successful sign-in.
#[derive(Debug)]
pub struct AuthenticatedUser {
    pub user: User,
    /// Bearer token for the data and storage services.
    pub token: SecretString,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AuthenticatedUser, AuthError>;

    /// Token-based providers have nothing to revoke.
    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }

    fn name(&self) -> &str;
}

#[derive(Clone)]
pub enum SessionMode {
    Demo,
    Remote { token: Arc<SecretString> },
}

impl std::fmt::Debug for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Demo => f.write_str("Demo"),
            SessionMode::Remote { .. } => f.write_str("Remote"),
        }
    }
}

/// A signed-in user. `generation` changes on every login and logout, so two
/// sessions for the same user are still told apart.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub mode: SessionMode,
    pub generation: u64,
}

impl Session {
    pub fn is_demo(&self) -> bool {
        matches!(self.mode, SessionMode::Demo)
    }
}

pub struct AuthContext {
    provider: Option<Arc<dyn IdentityProvider>>,
    tx: watch::Sender<Option<Session>>,
    generation: AtomicU64,
}

impl AuthContext {
    /// `None` means only demo mode is available.
    pub fn new(provider: Option<Arc<dyn IdentityProvider>>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            provider,
            tx,
            generation: AtomicU64::new(0),
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn session(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.tx.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn is_demo(&self) -> bool {
        self.tx.borrow().as_ref().is_some_and(Session::is_demo)
    }

    /// Receiver of session changes; the current value is available at once.
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn replace(&self, session: Option<Session>) {
        self.tx.send_replace(session);
    }

    pub async fn login(&self, email: &str, password: &SecretString) -> Result<Session, AuthError> {
        let provider = self.provider.as_ref().ok_or(AuthError::NotConfigured)?;
        let authenticated = provider.sign_in(email, password).await?;
        let session = Session {
            user: authenticated.user,
            mode: SessionMode::Remote {
                token: Arc::new(authenticated.token),
            },
            generation: self.next_generation(),
        };
        info!(user_id = %session.user.uid, provider = provider.name(), "Session started");
        self.replace(Some(session.clone()));
        Ok(session)
    }

    pub fn login_demo(&self) -> Session {
        let session = Session {
            user: User::demo(),
            mode: SessionMode::Demo,
            generation: self.next_generation(),
        };
        info!(user_id = %session.user.uid, "Demo session started");
        self.replace(Some(session.clone()));
        session
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        let previous = self.session();
        if let (Some(session), Some(provider)) = (&previous, &self.provider) {
            if !session.is_demo() {
                provider.sign_out().await?;
            }
        }
        if let Some(session) = previous {
            info!(user_id = %session.user.uid, "Session ended");
        }
        self.generation.fetch_add(1, Ordering::Relaxed);
        self.replace(None);
        Ok(())
    }
}
