/// Cache key builders

pub mod session_keys;

pub use session_keys::{pending_sign_in_key, rate_limit_key, session_key};
