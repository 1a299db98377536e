use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query string the provider appends to `/auth/callback`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub access_token: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    /// `location.href` of the callback page, fragment included.
    pub url: String,
    #[serde(default)]
    pub reloaded: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartSignInQuery {
    pub return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub email: String,
    pub return_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OtpResponse {
    pub sent_to: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub signed_out: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub expires_at: i64,
}
