use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};

use super::{SessionStore, SessionStoreError};
use crate::cache::keys::{pending_sign_in_key, session_key};
use crate::cache::models::{CachedSession, PendingSignIn};

/// Redis implementation; every record is JSON with a TTL.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: Arc<RedisClient>,
}

impl RedisSessionStore {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save_session(
        &self,
        session: &CachedSession,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let json = serde_json::to_string(session)?;
        let _: () = conn
            .set_ex(session_key(&session.session_id), json, ttl_secs(ttl))
            .await?;

        Ok(())
    }

    async fn load_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CachedSession>, SessionStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let result: Option<String> = conn.get(session_key(session_id)).await?;
        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove_session(&self, session_id: &str) -> Result<(), SessionStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let _: () = conn.del(session_key(session_id)).await?;

        Ok(())
    }

    async fn save_pending(
        &self,
        flow_id: &str,
        pending: &PendingSignIn,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let json = serde_json::to_string(pending)?;
        let _: () = conn
            .set_ex(pending_sign_in_key(flow_id), json, ttl_secs(ttl))
            .await?;

        Ok(())
    }

    async fn take_pending(
        &self,
        flow_id: &str,
    ) -> Result<Option<PendingSignIn>, SessionStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        // GETDEL so a verifier can only ever be used once
        let result: Option<String> = conn.get_del(pending_sign_in_key(flow_id)).await?;
        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
