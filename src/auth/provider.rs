use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::credential::ImplicitToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Session issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
    pub user: ProviderUser,
}

impl ProviderSession {
    pub fn email(&self) -> Option<&str> {
        self.user.email.as_deref()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected identity provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Message suitable for showing to the person signing in.
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::Rejected { message, .. } => message.clone(),
            ProviderError::Transport(_) => "The sign-in service could not be reached".into(),
            ProviderError::InvalidResponse(_) => "The sign-in service returned an invalid response".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            other => Err(format!("unsupported sign-in provider: {other}")),
        }
    }
}

/// The hosted identity service, reduced to the calls the sign-in flows make.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Trades an authorization code (plus PKCE verifier) for a session.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<ProviderSession, ProviderError>;

    /// Builds a session from implicit-flow token material after the provider vouches for it.
    async fn set_session(&self, token: &ImplicitToken) -> Result<ProviderSession, ProviderError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError>;

    async fn send_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<(), ProviderError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError>;

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
        extra: &[(&str, &str)],
    ) -> String;
}
