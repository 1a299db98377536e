// Redis-backed state: sessions, pending sign-ins and rate-limit counters

pub mod keys;
pub mod models;
pub mod operations;

pub use models::{CachedSession, PendingSignIn};
pub use operations::{RedisSessionStore, SessionStore, SessionStoreError};
