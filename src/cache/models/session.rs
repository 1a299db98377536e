use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{ProviderSession, ProviderUser};

/// Server-side session record, looked up through the session cookie.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CachedSession {
    pub session_id: String,
    pub user_id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: i64, // Unix timestamp, provider token expiry
    pub created_at: i64, // Unix timestamp
}

impl CachedSession {
    pub fn from_provider(session_id: String, session: ProviderSession) -> Self {
        Self {
            session_id,
            user_id: session.user.id,
            email: session.user.email,
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            token_type: session.token_type,
            expires_at: session.expires_at,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Replaces the provider tokens after a refresh, keeping the record's identity.
    pub fn refreshed(self, session: ProviderSession) -> Self {
        Self {
            created_at: self.created_at,
            ..Self::from_provider(self.session_id, session)
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    pub fn to_provider(&self) -> ProviderSession {
        ProviderSession {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at,
            user: ProviderUser {
                id: self.user_id,
                email: self.email.clone(),
            },
        }
    }
}
