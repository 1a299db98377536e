use serde::{Deserialize, Serialize};

/// State kept between starting a sign-in and the provider's callback.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PendingSignIn {
    pub code_verifier: String,
    pub return_to: Option<String>,
    pub created_at: i64, // Unix timestamp
}

impl PendingSignIn {
    pub fn new(code_verifier: String, return_to: Option<String>) -> Self {
        Self {
            code_verifier,
            return_to,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}
