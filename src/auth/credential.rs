use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Token material delivered in the URL fragment by the implicit flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub token_type: Option<String>,
}

/// Everything the identity provider can hand back on a redirect, read once from the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackCredential {
    ProviderError {
        code: String,
        description: Option<String>,
    },
    ImplicitToken(ImplicitToken),
    AuthCode(String),
    None,
}

fn non_empty(pairs: &HashMap<String, String>, key: &str) -> Option<String> {
    pairs
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl CallbackCredential {
    /// Parses an absolute URL or a site-relative path such as `/auth/callback?code=..`.
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse("http://localhost/")?;
        let url = Url::options().base_url(Some(&base)).parse(raw.trim())?;
        Ok(Self::from_url(&url))
    }

    pub fn from_url(url: &Url) -> Self {
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let fragment: HashMap<String, String> = url
            .fragment()
            .map(|f| url::form_urlencoded::parse(f.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        // errors win over any credential, fragment before query
        let error = non_empty(&fragment, "error")
            .map(|code| (code, &fragment))
            .or_else(|| non_empty(&query, "error").map(|code| (code, &query)));
        if let Some((code, origin)) = error {
            let description = non_empty(origin, "error_description")
                .or_else(|| non_empty(&fragment, "error_description"))
                .or_else(|| non_empty(&query, "error_description"));
            return Self::ProviderError { code, description };
        }

        if let Some(access_token) = non_empty(&fragment, "access_token") {
            return Self::ImplicitToken(ImplicitToken {
                access_token,
                refresh_token: non_empty(&fragment, "refresh_token"),
                expires_in: non_empty(&fragment, "expires_in").and_then(|v| v.parse().ok()),
                token_type: non_empty(&fragment, "token_type"),
            });
        }

        match non_empty(&query, "code").or_else(|| non_empty(&fragment, "code")) {
            Some(code) => Self::AuthCode(code),
            None => Self::None,
        }
    }
}

/// The URL with its fragment removed, used for the single implicit-flow reload.
pub fn strip_fragment(raw: &str) -> String {
    match raw.split_once('#') {
        Some((head, _)) => head.to_string(),
        None => raw.to_string(),
    }
}
