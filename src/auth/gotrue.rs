use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::credential::ImplicitToken;
use super::provider::{IdentityProvider, OAuthProvider, ProviderError, ProviderSession, ProviderUser};
use crate::config::Config;

const DEFAULT_EXPIRES_IN: i64 = 3600;

/// REST client for a GoTrue-compatible auth service (`/auth/v1`).
#[derive(Clone)]
pub struct GoTrueClient {
    http: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

impl TokenResponse {
    fn into_session(self) -> ProviderSession {
        let expires_at = self.expires_at.unwrap_or_else(|| {
            chrono::Utc::now().timestamp() + self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN)
        });
        ProviderSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".into()),
            expires_at,
            user: self.user,
        }
    }
}

/// GoTrue reports failures in a few different shapes depending on the endpoint.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

impl GoTrueClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            base_url: format!("{}/auth/v1", config.provider_url),
            anon_key: config.provider_anon_key.clone(),
        }
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.anon_key)
    }

    async fn check(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(ErrorBody::message)
            .unwrap_or_else(|| format!("request failed with status {status}"));
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<ProviderSession, ProviderError> {
        let response = self
            .request(self.http.post(format!("{}/token", self.base_url)))
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(token.into_session())
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<ProviderSession, ProviderError> {
        tracing::debug!("Exchanging authorization code with identity provider");
        self.token_grant(
            "pkce",
            json!({
                "auth_code": code,
                "code_verifier": verifier.unwrap_or_default(),
            }),
        )
        .await
    }

    async fn set_session(&self, token: &ImplicitToken) -> Result<ProviderSession, ProviderError> {
        let response = self
            .request(self.http.get(format!("{}/user", self.base_url)))
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        let user: ProviderUser = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(ProviderSession {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone().unwrap_or_default(),
            token_type: token.token_type.clone().unwrap_or_else(|| "bearer".into()),
            expires_at: chrono::Utc::now().timestamp()
                + token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
            user,
        })
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn send_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .request(self.http.post(format!("{}/otp", self.base_url)))
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({
                "email": email,
                "create_user": true,
                "code_challenge": code_challenge,
                "code_challenge_method": "s256",
            }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        let response = self
            .request(self.http.post(format!("{}/logout", self.base_url)))
            .query(&[("scope", "global")])
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
        extra: &[(&str, &str)],
    ) -> String {
        let base = format!("{}/authorize", self.base_url);
        match Url::parse(&base) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("provider", provider.as_str())
                    .append_pair("redirect_to", redirect_to)
                    .append_pair("code_challenge", code_challenge)
                    .append_pair("code_challenge_method", "s256")
                    .extend_pairs(extra.iter());
                url.into()
            }
            Err(e) => {
                tracing::error!("Invalid identity provider URL {}: {}", base, e);
                base
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoTrueClient {
        GoTrueClient::new(Client::new(), &Config::for_tests())
    }

    #[test]
    fn authorize_url_carries_pkce_and_domain_hint() {
        let url = client().authorize_url(
            OAuthProvider::Google,
            "http://localhost:3000/auth/callback",
            "challenge",
            &[("hd", "nits.ac.in"), ("prompt", "consent")],
        );
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".into(), "google".into())));
        assert!(pairs.contains(&(
            "redirect_to".into(),
            "http://localhost:3000/auth/callback".into()
        )));
        assert!(pairs.contains(&("code_challenge".into(), "challenge".into())));
        assert!(pairs.contains(&("code_challenge_method".into(), "s256".into())));
        assert!(pairs.contains(&("hd".into(), "nits.ac.in".into())));
    }

    #[test]
    fn error_body_prefers_description() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Invalid code or code verifier"}"#,
        )
        .unwrap();
        assert_eq!(body.message().as_deref(), Some("Invalid code or code verifier"));

        let body: ErrorBody =
            serde_json::from_str(r#"{"code":400,"msg":"Email rate limit exceeded"}"#).unwrap();
        assert_eq!(body.message().as_deref(), Some("Email rate limit exceeded"));
    }

    #[test]
    fn token_response_without_expires_at_uses_expires_in() {
        let token: TokenResponse = serde_json::from_str(
            r#"{
                "access_token": "at",
                "refresh_token": "rt",
                "token_type": "bearer",
                "expires_in": 60,
                "user": {"id": "6f1c2a4e-3b1d-4d6e-9a51-1e2f3a4b5c6d", "email": "a@nits.ac.in"}
            }"#,
        )
        .unwrap();
        let before = chrono::Utc::now().timestamp();
        let session = token.into_session();
        assert!(session.expires_at >= before + 60);
        assert_eq!(session.email(), Some("a@nits.ac.in"));
    }
}
