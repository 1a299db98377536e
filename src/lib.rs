use std::sync::Arc;

use sqlx::PgPool;

use auth::{DomainGate, IdentityProvider};
use cache::SessionStore;
use config::Config;
use storage::StorageClient;

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod result;
pub mod router;
pub mod routes;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_support;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub sessions: Arc<dyn SessionStore>,
    pub provider: Arc<dyn IdentityProvider>,
    pub storage: StorageClient,
    pub gate: DomainGate,
}
