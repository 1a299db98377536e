//! In-memory doubles for the session store and the identity provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::Response;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::AppState;
use crate::auth::{
    DomainGate, IdentityProvider, ImplicitToken, OAuthProvider, ProviderError, ProviderSession,
    ProviderUser,
};
use crate::cache::{CachedSession, PendingSignIn, SessionStore, SessionStoreError};
use crate::config::Config;
use crate::storage::StorageClient;

pub const TEST_USER_ID: Uuid = Uuid::from_u128(0x6f1c2a4e_3b1d_4d6e_9a51_1e2f3a4b5c6d);

pub fn session_for(email: &str) -> ProviderSession {
    ProviderSession {
        access_token: format!("access-{email}"),
        refresh_token: format!("refresh-{email}"),
        token_type: "bearer".into(),
        expires_at: chrono::Utc::now().timestamp() + 3600,
        user: ProviderUser {
            id: TEST_USER_ID,
            email: Some(email.to_string()),
        },
    }
}

#[derive(Default)]
struct Calls {
    exchanged: Vec<(String, Option<String>)>,
    set_session: Vec<String>,
    refreshed: Vec<String>,
    magic_links: Vec<(String, String)>,
    sign_outs: Vec<String>,
}

/// Records every call; either signs everybody in as one email or rejects everything.
pub struct MockProvider {
    email: Option<String>,
    rejection: Option<String>,
    calls: Mutex<Calls>,
}

impl MockProvider {
    pub fn signing_in(email: &str) -> Self {
        Self {
            email: Some(email.to_string()),
            rejection: None,
            calls: Mutex::default(),
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            email: None,
            rejection: Some(message.to_string()),
            calls: Mutex::default(),
        }
    }

    fn outcome(&self) -> Result<ProviderSession, ProviderError> {
        match (&self.rejection, &self.email) {
            (Some(message), _) => Err(ProviderError::Rejected {
                status: 400,
                message: message.clone(),
            }),
            (None, Some(email)) => Ok(session_for(email)),
            (None, None) => Err(ProviderError::InvalidResponse("no user".into())),
        }
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }

    pub fn exchanged_codes(&self) -> Vec<String> {
        self.calls().exchanged.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn exchange_calls(&self) -> usize {
        self.calls().exchanged.len()
    }

    pub fn last_verifier(&self) -> Option<String> {
        self.calls().exchanged.last().and_then(|(_, v)| v.clone())
    }

    pub fn set_session_tokens(&self) -> Vec<String> {
        self.calls().set_session.clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.calls().refreshed.len()
    }

    pub fn magic_links(&self) -> Vec<(String, String)> {
        self.calls().magic_links.clone()
    }

    pub fn sign_out_calls(&self) -> usize {
        self.calls().sign_outs.len()
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<ProviderSession, ProviderError> {
        self.calls()
            .exchanged
            .push((code.to_string(), verifier.map(str::to_string)));
        self.outcome()
    }

    async fn set_session(&self, token: &ImplicitToken) -> Result<ProviderSession, ProviderError> {
        self.calls().set_session.push(token.access_token.clone());
        self.outcome().map(|mut session| {
            session.access_token = token.access_token.clone();
            session
        })
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError> {
        self.calls().refreshed.push(refresh_token.to_string());
        self.outcome()
    }

    async fn send_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
        _code_challenge: &str,
    ) -> Result<(), ProviderError> {
        self.calls()
            .magic_links
            .push((email.to_string(), redirect_to.to_string()));
        match &self.rejection {
            Some(message) => Err(ProviderError::Rejected {
                status: 429,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        self.calls().sign_outs.push(access_token.to_string());
        Ok(())
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
        _extra: &[(&str, &str)],
    ) -> String {
        format!(
            "http://provider.test/authorize?provider={}&redirect_to={}&code_challenge={}",
            provider.as_str(),
            redirect_to,
            code_challenge
        )
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, CachedSession>>,
    pending: Mutex<HashMap<String, PendingSignIn>>,
}

impl MemorySessionStore {
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    pub fn session(&self, session_id: &str) -> Option<CachedSession> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    pub fn pending(&self, flow_id: &str) -> Option<PendingSignIn> {
        self.pending.lock().unwrap().get(flow_id).cloned()
    }

    pub fn insert_session(&self, session: CachedSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.clone(), session);
    }

    pub fn insert_pending(&self, flow_id: &str, pending: PendingSignIn) {
        self.pending
            .lock()
            .unwrap()
            .insert(flow_id.to_string(), pending);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save_session(
        &self,
        session: &CachedSession,
        _ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        self.insert_session(session.clone());
        Ok(())
    }

    async fn load_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CachedSession>, SessionStoreError> {
        Ok(self.session(session_id))
    }

    async fn remove_session(&self, session_id: &str) -> Result<(), SessionStoreError> {
        self.sessions.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn save_pending(
        &self,
        flow_id: &str,
        pending: &PendingSignIn,
        _ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        self.insert_pending(flow_id, pending.clone());
        Ok(())
    }

    async fn take_pending(
        &self,
        flow_id: &str,
    ) -> Result<Option<PendingSignIn>, SessionStoreError> {
        Ok(self.pending.lock().unwrap().remove(flow_id))
    }
}

pub struct TestApp {
    pub router: Router,
    pub provider: Arc<MockProvider>,
    pub sessions: Arc<MemorySessionStore>,
    pub config: Config,
}

pub fn test_app(provider: MockProvider) -> TestApp {
    test_app_with(provider, Config::for_tests())
}

pub fn test_app_with(provider: MockProvider, config: Config) -> TestApp {
    let provider = Arc::new(provider);
    let sessions = Arc::new(MemorySessionStore::default());
    // never connects unless a handler actually queries
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let http = reqwest::Client::new();
    let state = AppState {
        pool,
        storage: StorageClient::new(http, &config),
        gate: DomainGate::new(config.institute_domain.clone()),
        sessions: sessions.clone(),
        provider: provider.clone(),
        config: config.clone(),
    };
    TestApp {
        router: crate::router::create_router(state),
        provider,
        sessions,
        config,
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Value of a `Set-Cookie` header for `name`, if the response sets it.
pub fn set_cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| {
            let pair = v.split(';').next()?;
            let (n, value) = pair.split_once('=')?;
            (n.trim() == name).then(|| value.trim().to_string())
        })
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(axum::http::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
