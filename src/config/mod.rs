use std::env;
use std::str::FromStr;
use std::time::Duration;

/// What the callback receiver does when the provider refuses a code exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeFailurePolicy {
    /// Log the failure and continue to the home page unauthenticated.
    Open,
    /// Send the browser back to the login page with the provider's message.
    Closed,
}

impl FromStr for ExchangeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown exchange failure policy: {other}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub site_url: String,
    pub provider_url: String,
    pub provider_anon_key: String,
    pub provider_jwt_secret: String,
    pub institute_domain: String,
    pub storage_bucket: String,
    pub session_ttl_secs: u64,
    pub callback_success_delay_ms: u64,
    pub callback_cancel_delay_ms: u64,
    pub exchange_failure_policy: ExchangeFailurePolicy,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    /// Read client addresses from `x-real-ip` / `x-forwarded-for`.
    pub trust_proxy_headers: bool,
    pub max_upload_bytes: usize,
    pub http_timeout_secs: u64,
    pub cookie_secure: bool,
    pub run_migrations: bool,
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn optional<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // SESSION_TTL is given in hours, e.g. "24h"
        let session_ttl = match env::var("SESSION_TTL") {
            Ok(value) => value
                .trim_end_matches('h')
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid {
                    var: "SESSION_TTL",
                    value,
                })?,
            Err(_) => 24,
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            server_host: optional("SERVER_HOST", "::".to_string())?,
            server_port: optional("SERVER_PORT", 3000)?,
            site_url: required("SITE_URL")?.trim_end_matches('/').to_string(),
            provider_url: required("AUTH_PROVIDER_URL")?
                .trim_end_matches('/')
                .to_string(),
            provider_anon_key: required("AUTH_PROVIDER_ANON_KEY")?,
            provider_jwt_secret: required("AUTH_JWT_SECRET")?,
            institute_domain: optional("INSTITUTE_EMAIL_DOMAIN", "nits.ac.in".to_string())?
                .trim_start_matches('.')
                .to_ascii_lowercase(),
            storage_bucket: optional("STORAGE_BUCKET", "item-images".to_string())?,
            session_ttl_secs: session_ttl * 3600,
            callback_success_delay_ms: optional("CALLBACK_SUCCESS_DELAY_MS", 3000)?,
            callback_cancel_delay_ms: optional("CALLBACK_CANCEL_DELAY_MS", 2000)?,
            exchange_failure_policy: optional(
                "AUTH_EXCHANGE_FAILURE",
                ExchangeFailurePolicy::Open,
            )?,
            rate_limit_window_secs: optional("RATE_LIMIT_WINDOW", 60)?,
            rate_limit_requests: optional("RATE_LIMIT_REQUESTS", 100)?,
            trust_proxy_headers: optional("TRUST_PROXY_HEADERS", false)?,
            max_upload_bytes: optional("MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            http_timeout_secs: optional("HTTP_TIMEOUT_SECS", 15)?,
            cookie_secure: optional("COOKIE_SECURE", true)?,
            run_migrations: optional("RUN_MIGRATIONS", false)?,
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn success_delay(&self) -> Duration {
        Duration::from_millis(self.callback_success_delay_ms)
    }

    pub fn cancel_delay(&self) -> Duration {
        Duration::from_millis(self.callback_cancel_delay_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Where the provider sends the browser after sign-in.
    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.site_url)
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/marketplace_test".into(),
            redis_url: "redis://127.0.0.1/".into(),
            server_host: "127.0.0.1".into(),
            server_port: 0,
            site_url: "http://localhost:3000".into(),
            provider_url: "http://provider.test".into(),
            provider_anon_key: "anon-key".into(),
            provider_jwt_secret: "test-jwt-secret".into(),
            institute_domain: "nits.ac.in".into(),
            storage_bucket: "item-images".into(),
            session_ttl_secs: 3600,
            callback_success_delay_ms: 3000,
            callback_cancel_delay_ms: 2000,
            exchange_failure_policy: ExchangeFailurePolicy::Open,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            trust_proxy_headers: false,
            max_upload_bytes: 1024,
            http_timeout_secs: 5,
            cookie_secure: false,
            run_migrations: false,
        }
    }
}
