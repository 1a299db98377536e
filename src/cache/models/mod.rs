/// Cached data models

pub mod pending;
pub mod session;

pub use pending::PendingSignIn;
pub use session::CachedSession;
