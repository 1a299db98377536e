//! Turns whatever the identity provider put on the callback URL into one outcome.
//!
//! The URL is parsed once into a [`CallbackCredential`]; each variant then gets exactly one
//! transition. A successful transition always passes through the [`DomainGate`] before the
//! session is handed back for persisting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::credential::{CallbackCredential, ImplicitToken};
use super::domain_gate::DomainGate;
use super::provider::{IdentityProvider, ProviderSession};
use super::{HOME_PATH, LOGIN_PATH, login_path_with_error};

/// Provider error codes that mean the person backed out on purpose.
const CANCELLED_CODES: &[&str] = &["access_denied", "user_cancelled", "cancelled"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackState {
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Cancelled,
    Failed,
    DomainRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedRedirect {
    pub to: String,
    pub after_ms: u64,
}

/// What the callback page should show and do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub state: CallbackState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<DelayedRedirect>,
    /// Manual retry target shown with a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<String>,
    /// Reload this URL (fragment stripped) and reconcile again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload: Option<String>,
}

/// Session bookkeeping the caller has to apply after reconciling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    Unchanged,
    Establish(ProviderSession),
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub outcome: ReconcileOutcome,
    pub session: SessionChange,
}

/// Per-request inputs besides the credential itself.
#[derive(Debug, Clone, Default)]
pub struct CallbackContext {
    /// Session this browser already holds, if any.
    pub existing: Option<ProviderSession>,
    /// PKCE verifier from the pending sign-in.
    pub verifier: Option<String>,
    /// Where a cancelled sign-in goes back to.
    pub return_to: Option<String>,
    /// Set when this request follows the implicit-flow reload.
    pub reloaded: bool,
    /// The callback URL without its fragment.
    pub reload_url: String,
}

pub struct Reconciler<'a> {
    provider: &'a dyn IdentityProvider,
    gate: &'a DomainGate,
    success_delay: Duration,
    cancel_delay: Duration,
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

impl<'a> Reconciler<'a> {
    pub fn new(
        provider: &'a dyn IdentityProvider,
        gate: &'a DomainGate,
        success_delay: Duration,
        cancel_delay: Duration,
    ) -> Self {
        Self {
            provider,
            gate,
            success_delay,
            cancel_delay,
        }
    }

    pub async fn run(&self, credential: CallbackCredential, ctx: CallbackContext) -> Reconciliation {
        match credential {
            CallbackCredential::ProviderError { code, description } => {
                self.provider_error(&code, description, ctx.return_to)
            }
            CallbackCredential::ImplicitToken(token) => self.implicit(token, ctx).await,
            CallbackCredential::AuthCode(code) => self.auth_code(&code, ctx).await,
            // the reload target has no fragment, so the second pass lands here
            CallbackCredential::None if ctx.reloaded => match ctx.existing {
                Some(existing) => self.accept(existing, false).await,
                None => {
                    tracing::error!("Callback still has no credential after reload");
                    self.failed("Sign-in could not be completed, please try again".into())
                }
            },
            CallbackCredential::None => {
                tracing::info!("Callback without code, token or error; treating as cancelled");
                self.cancelled("Sign-in was cancelled".into(), LOGIN_PATH.to_string())
            }
        }
    }

    fn provider_error(
        &self,
        code: &str,
        description: Option<String>,
        return_to: Option<String>,
    ) -> Reconciliation {
        let message = description.unwrap_or_else(|| code.replace('_', " "));
        if CANCELLED_CODES.contains(&code.to_ascii_lowercase().as_str()) {
            tracing::info!("Sign-in cancelled at the provider: {}", code);
            let to = return_to.unwrap_or_else(|| LOGIN_PATH.to_string());
            return self.cancelled(message, to);
        }
        tracing::warn!("Identity provider reported {}: {}", code, message);
        self.failed(message)
    }

    async fn implicit(&self, token: ImplicitToken, ctx: CallbackContext) -> Reconciliation {
        if let Some(existing) = ctx.existing {
            return self.accept(existing, false).await;
        }

        match self.provider.set_session(&token).await {
            Ok(session) => self.accept(session, true).await,
            Err(e) if !ctx.reloaded => {
                tracing::warn!("Could not set session from token fragment, reloading once: {}", e);
                Reconciliation {
                    outcome: ReconcileOutcome {
                        state: CallbackState::Loading,
                        classification: None,
                        message: None,
                        redirect: None,
                        retry: None,
                        reload: Some(ctx.reload_url),
                    },
                    session: SessionChange::Unchanged,
                }
            }
            Err(e) => {
                tracing::error!("Could not set session from token fragment after reload: {}", e);
                self.failed(e.user_message())
            }
        }
    }

    async fn auth_code(&self, code: &str, ctx: CallbackContext) -> Reconciliation {
        match self.provider.exchange_code(code, ctx.verifier.as_deref()).await {
            Ok(session) => self.accept(session, true).await,
            Err(e) => match ctx.existing {
                // the server-side receiver may already have consumed this code
                Some(existing) => {
                    tracing::info!("Code exchange failed but a session exists: {}", e);
                    self.accept(existing, false).await
                }
                None => {
                    tracing::error!("Code exchange failed: {}", e);
                    self.failed(e.user_message())
                }
            },
        }
    }

    /// Domain check on a freshly established (or already held) session.
    async fn accept(&self, session: ProviderSession, fresh: bool) -> Reconciliation {
        if let Err(rejection) = self.gate.check(session.email()) {
            tracing::warn!("Rejected sign-in for {:?}: outside institute domain", rejection.email);
            if let Err(e) = self.provider.sign_out(&session.access_token).await {
                tracing::warn!("Provider sign-out after domain rejection failed: {}", e);
            }
            return Reconciliation {
                outcome: ReconcileOutcome {
                    state: CallbackState::Error,
                    classification: Some(Classification::DomainRejected),
                    redirect: Some(DelayedRedirect {
                        to: login_path_with_error(&rejection.message),
                        after_ms: 0,
                    }),
                    message: Some(rejection.message),
                    retry: None,
                    reload: None,
                },
                session: SessionChange::Discard,
            };
        }

        tracing::info!("Signed in user {}", session.user.id);
        Reconciliation {
            outcome: ReconcileOutcome {
                state: CallbackState::Success,
                classification: None,
                message: None,
                redirect: Some(DelayedRedirect {
                    to: HOME_PATH.to_string(),
                    after_ms: millis(self.success_delay),
                }),
                retry: None,
                reload: None,
            },
            session: if fresh {
                SessionChange::Establish(session)
            } else {
                SessionChange::Unchanged
            },
        }
    }

    fn cancelled(&self, message: String, to: String) -> Reconciliation {
        Reconciliation {
            outcome: ReconcileOutcome {
                state: CallbackState::Error,
                classification: Some(Classification::Cancelled),
                message: Some(message),
                redirect: Some(DelayedRedirect {
                    to,
                    after_ms: millis(self.cancel_delay),
                }),
                retry: None,
                reload: None,
            },
            session: SessionChange::Unchanged,
        }
    }

    fn failed(&self, message: String) -> Reconciliation {
        Reconciliation {
            outcome: ReconcileOutcome {
                state: CallbackState::Error,
                classification: Some(Classification::Failed),
                message: Some(message),
                redirect: None,
                retry: Some(LOGIN_PATH.to_string()),
                reload: None,
            },
            session: SessionChange::Unchanged,
        }
    }
}
