use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect},
};
use axum_extra::extract::{CookieJar, cookie::Cookie};

use crate::{
    AppState,
    auth::{
        CallbackCredential, FLOW_COOKIE, HOME_PATH, OAuthProvider, ProviderSession,
        SESSION_COOKIE, auth_cookie,
        credential::strip_fragment,
        expired_cookie, login_path_with_error,
        reconcile::{CallbackContext, Reconciler, Reconciliation, SessionChange},
    },
    cache::{CachedSession, PendingSignIn},
    config::ExchangeFailurePolicy,
    error::{AppError, AppResult},
    middleware::current_session,
    utils::{generate_pkce, random_token, sanitize_return_to, success_to_api_response},
};

use super::model::{
    CallbackQuery, LogoutResponse, OtpRequest, OtpResponse, ReconcileRequest, SessionResponse,
    StartSignInQuery,
};

/// How long a started sign-in waits for the provider's callback.
const PENDING_SIGN_IN_TTL: Duration = Duration::from_secs(600);

const CALLBACK_PAGE: &str = include_str!("../../../static/callback.html");

/// Stores a fresh session record and returns the cookie naming it. A record the browser
/// already pointed at is dropped first.
async fn persist_session(
    state: &AppState,
    previous: Option<&str>,
    session: ProviderSession,
) -> AppResult<Cookie<'static>> {
    if let Some(previous) = previous {
        if let Err(e) = state.sessions.remove_session(previous).await {
            tracing::warn!("Failed to drop replaced session: {}", e);
        }
    }

    let record = CachedSession::from_provider(random_token(), session);
    state
        .sessions
        .save_session(&record, state.config.session_ttl())
        .await?;
    Ok(auth_cookie(
        SESSION_COOKIE,
        record.session_id,
        state.config.cookie_secure,
    ))
}

/// Consumes the pending sign-in named by the flow cookie. Store failures count as absent.
async fn take_pending(state: &AppState, jar: &CookieJar) -> Option<PendingSignIn> {
    let flow_id = jar.get(FLOW_COOKIE)?.value().to_string();
    match state.sessions.take_pending(&flow_id).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!("Failed to load pending sign-in: {}", e);
            None
        }
    }
}

fn clear_flow(jar: CookieJar) -> CookieJar {
    if jar.get(FLOW_COOKIE).is_some() {
        jar.remove(expired_cookie(FLOW_COOKIE))
    } else {
        jar
    }
}

/// Creates a pending sign-in, sets the flow cookie and returns the PKCE challenge.
async fn begin_sign_in(
    state: &AppState,
    jar: CookieJar,
    return_to: Option<&str>,
) -> AppResult<(CookieJar, String)> {
    let pkce = generate_pkce();
    let flow_id = random_token();
    let pending = PendingSignIn::new(pkce.verifier, sanitize_return_to(return_to));
    state
        .sessions
        .save_pending(&flow_id, &pending, PENDING_SIGN_IN_TTL)
        .await?;

    let jar = jar.add(auth_cookie(FLOW_COOKIE, flow_id, state.config.cookie_secure));
    Ok((jar, pkce.challenge))
}

/// Server-side callback receiver for the authorization-code flow.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> (CookieJar, Redirect) {
    // tokens on the query mean this request already went through a sign-in
    if query.access_token.is_some() {
        tracing::debug!("Callback carries an access token, skipping exchange");
        return (jar, Redirect::to(HOME_PATH));
    }

    let Some(code) = query.code.filter(|c| !c.trim().is_empty()) else {
        if let Some(error) = &query.error {
            tracing::info!(
                "Callback without code, provider reported {}: {}",
                error,
                query.error_description.as_deref().unwrap_or("")
            );
        }
        return (jar, Redirect::to(HOME_PATH));
    };

    let pending = take_pending(&state, &jar).await;
    let jar = clear_flow(jar);
    let verifier = pending.as_ref().map(|p| p.code_verifier.as_str());

    let session = match state.provider.exchange_code(&code, verifier).await {
        Ok(session) => session,
        Err(e) => {
            return match state.config.exchange_failure_policy {
                ExchangeFailurePolicy::Open => {
                    tracing::warn!("Code exchange failed, continuing unauthenticated: {}", e);
                    (jar, Redirect::to(HOME_PATH))
                }
                ExchangeFailurePolicy::Closed => {
                    tracing::warn!("Code exchange failed: {}", e);
                    (jar, Redirect::to(&login_path_with_error(&e.user_message())))
                }
            };
        }
    };

    if let Err(rejection) = state.gate.check(session.email()) {
        tracing::warn!(
            "Rejected sign-in for {:?}: outside institute domain",
            rejection.email
        );
        if let Err(e) = state.provider.sign_out(&session.access_token).await {
            tracing::warn!("Provider sign-out after domain rejection failed: {}", e);
        }
        return (jar, Redirect::to(&login_path_with_error(&rejection.message)));
    }

    let user_id = session.user.id;
    let previous = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    match persist_session(&state, previous.as_deref(), session).await {
        Ok(cookie) => {
            tracing::info!("Signed in user {}", user_id);
            (jar.add(cookie), Redirect::to(HOME_PATH))
        }
        Err(e) => {
            tracing::error!("Failed to persist session: {}", e);
            (
                jar,
                Redirect::to(&login_path_with_error(
                    "Could not start your session, please try again",
                )),
            )
        }
    }
}

/// Browser page that forwards `location.href` (fragment included) to [`reconcile`].
pub async fn callback_page() -> Html<&'static str> {
    Html(CALLBACK_PAGE)
}

pub async fn reconcile(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<ReconcileRequest>,
) -> AppResult<impl IntoResponse> {
    let credential = CallbackCredential::parse(&req.url)
        .map_err(|e| AppError::Validation(format!("Invalid callback URL: {e}")))?;

    let existing = current_session(&state, &jar).await?;
    let pending = take_pending(&state, &jar).await;
    let jar = clear_flow(jar);

    let ctx = CallbackContext {
        existing: existing.as_ref().map(CachedSession::to_provider),
        verifier: pending.as_ref().map(|p| p.code_verifier.clone()),
        return_to: pending.and_then(|p| p.return_to),
        reloaded: req.reloaded,
        reload_url: strip_fragment(&req.url),
    };

    let reconciler = Reconciler::new(
        state.provider.as_ref(),
        &state.gate,
        state.config.success_delay(),
        state.config.cancel_delay(),
    );
    let Reconciliation { outcome, session } = reconciler.run(credential, ctx).await;

    let previous = existing.map(|s| s.session_id);
    let jar = match session {
        SessionChange::Unchanged => jar,
        SessionChange::Establish(session) => {
            jar.add(persist_session(&state, previous.as_deref(), session).await?)
        }
        SessionChange::Discard => {
            if let Some(previous) = previous {
                state.sessions.remove_session(&previous).await?;
            }
            jar.remove(expired_cookie(SESSION_COOKIE))
        }
    };

    Ok((jar, success_to_api_response(outcome)))
}

pub async fn start_oauth(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(provider): Path<String>,
    Query(query): Query<StartSignInQuery>,
) -> AppResult<(CookieJar, Redirect)> {
    let provider: OAuthProvider = provider.parse().map_err(AppError::Validation)?;
    let (jar, challenge) = begin_sign_in(&state, jar, query.return_to.as_deref()).await?;

    let url = state.provider.authorize_url(
        provider,
        &state.config.callback_url(),
        &challenge,
        &[
            ("hd", state.gate.domain()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    );
    tracing::debug!("Starting {} sign-in", provider.as_str());
    Ok((jar, Redirect::to(&url)))
}

pub async fn send_otp(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<OtpRequest>,
) -> AppResult<impl IntoResponse> {
    let email = req.email.trim().to_ascii_lowercase();
    // nothing is sent to addresses the gate would reject afterwards anyway
    state
        .gate
        .check(Some(email.as_str()))
        .map_err(|rejection| AppError::Validation(rejection.message))?;

    let (jar, challenge) = begin_sign_in(&state, jar, req.return_to.as_deref()).await?;
    state
        .provider
        .send_magic_link(&email, &state.config.callback_url(), &challenge)
        .await?;

    tracing::info!("Sent sign-in link to {}", email);
    Ok((jar, success_to_api_response(OtpResponse { sent_to: email })))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let session_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let mut signed_out = false;

    if let Some(session_id) = session_id {
        if let Some(session) = state.sessions.load_session(&session_id).await? {
            state.sessions.remove_session(&session_id).await?;
            if let Err(e) = state.provider.sign_out(&session.access_token).await {
                tracing::warn!("Provider sign-out failed: {}", e);
            }
            signed_out = true;
        }
    }

    let jar = clear_flow(jar).remove(expired_cookie(SESSION_COOKIE));
    Ok((jar, success_to_api_response(LogoutResponse { signed_out })))
}

pub async fn current_user(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let session = current_session(&state, &jar).await?;
    Ok(success_to_api_response(session.map(|s| SessionResponse {
        user_id: s.user_id,
        email: s.email,
        expires_at: s.expires_at,
    })))
}
