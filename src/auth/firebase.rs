use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::User;

use super::{AuthError, AuthenticatedUser, IdentityProvider};

const IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    profile_picture: Option<String>,
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

/// Codes the identity service uses for a wrong email/password pair.
fn is_credential_error(code: &str) -> bool {
    let code = code.split(':').next().unwrap_or(code).trim();
    matches!(
        code,
        "INVALID_PASSWORD"
            | "EMAIL_NOT_FOUND"
            | "INVALID_LOGIN_CREDENTIALS"
            | "INVALID_EMAIL"
            | "USER_DISABLED"
    )
}

/// Email/password sign-in through the Identity Toolkit REST API.
pub struct FirebaseIdentity {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl FirebaseIdentity {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            base_url: IDENTITY_BASE_URL.to_string(),
            api_key,
        }
    }

    /// Point at another endpoint (tests, emulator). Includes the API version.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AuthenticatedUser, AuthError> {
        let url = format!("{}/accounts:signInWithPassword", self.base_url);
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&SignInRequest {
                email,
                password: password.expose_secret(),
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            if is_credential_error(&message) {
                warn!(email = %email, "Sign-in rejected");
                return Err(AuthError::InvalidCredentials);
            }
            return Err(AuthError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SignInResponse = serde_json::from_str(&body).map_err(|e| AuthError::Remote {
            status: status.as_u16(),
            message: format!("unexpected sign-in response ({e})"),
        })?;

        info!(user_id = %parsed.local_id, "Signed in");
        let user = User {
            uid: parsed.local_id,
            display_name: parsed.display_name.filter(|s| !s.is_empty()),
            email: parsed.email.or_else(|| Some(email.to_string())),
            photo_url: parsed.profile_picture.filter(|s| !s.is_empty()),
        };
        Ok(AuthenticatedUser {
            user,
            token: SecretString::new(parsed.id_token.into()),
        })
    }

    fn name(&self) -> &str {
        "firebase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_error_codes() {
        assert!(is_credential_error("INVALID_LOGIN_CREDENTIALS"));
        assert!(is_credential_error("INVALID_PASSWORD : wrong"));
        assert!(!is_credential_error("TOO_MANY_ATTEMPTS_TRY_LATER"));
    }

    #[test]
    fn sign_in_request_uses_wire_names() {
        let json = serde_json::to_value(SignInRequest {
            email: "a@b.c",
            password: "pw",
            return_secure_token: true,
        })
        .unwrap();
        assert_eq!(json["returnSecureToken"], true);
        assert_eq!(json["email"], "a@b.c");
    }
}
