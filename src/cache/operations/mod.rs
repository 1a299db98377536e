/// Cache operations

pub mod session;

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::models::{CachedSession, PendingSignIn};

pub use session::RedisSessionStore;

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("corrupt session record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage for sessions and pending sign-ins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_session(
        &self,
        session: &CachedSession,
        ttl: Duration,
    ) -> Result<(), SessionStoreError>;

    async fn load_session(&self, session_id: &str)
    -> Result<Option<CachedSession>, SessionStoreError>;

    async fn remove_session(&self, session_id: &str) -> Result<(), SessionStoreError>;

    async fn save_pending(
        &self,
        flow_id: &str,
        pending: &PendingSignIn,
        ttl: Duration,
    ) -> Result<(), SessionStoreError>;

    /// Returns the pending sign-in and deletes it; a second call yields `None`.
    async fn take_pending(&self, flow_id: &str)
    -> Result<Option<PendingSignIn>, SessionStoreError>;
}
