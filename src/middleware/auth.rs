use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{SESSION_COOKIE, claims::verify_access_token, expired_cookie, login_path_with_error},
    cache::CachedSession,
    error::AppError,
};

/// The signed-in caller, inserted into request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub access_token: String,
}

/// Guards protected routes: resolves the caller, refreshes expired sessions, and runs the
/// domain gate before anything is served.
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let bearer = req.headers().typed_get::<Authorization<Bearer>>();

    let user = match bearer {
        Some(header) => from_bearer(&state, header.token()),
        None => match from_cookie(&state, jar).await {
            Ok(user) => Ok(user),
            Err(response) => return response,
        },
    };

    match user {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

fn from_bearer(state: &AppState, token: &str) -> Result<CurrentUser, AppError> {
    let claims = verify_access_token(token, &state.config.provider_jwt_secret).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        AppError::Unauthorized
    })?;

    // no local session to invalidate for API clients, so this is a plain 403
    state
        .gate
        .check(claims.email.as_deref())
        .map_err(|rejection| AppError::Forbidden(rejection.message))?;

    Ok(CurrentUser {
        id: claims.sub,
        email: claims.email.unwrap_or_default(),
        access_token: token.to_string(),
    })
}

async fn from_cookie(state: &AppState, jar: CookieJar) -> Result<CurrentUser, Response> {
    let Some(session) = current_session(state, &jar)
        .await
        .map_err(IntoResponse::into_response)?
    else {
        return Err(
            (jar.remove(expired_cookie(SESSION_COOKIE)), AppError::Unauthorized).into_response(),
        );
    };

    if let Err(rejection) = state.gate.check(session.email.as_deref()) {
        tracing::warn!(
            "Signing out {:?}: email outside institute domain",
            rejection.email
        );
        if let Err(e) = state.sessions.remove_session(&session.session_id).await {
            tracing::error!("Failed to remove rejected session: {}", e);
        }
        if let Err(e) = state.provider.sign_out(&session.access_token).await {
            tracing::warn!("Provider sign-out failed: {}", e);
        }
        return Err((
            jar.remove(expired_cookie(SESSION_COOKIE)),
            Redirect::to(&login_path_with_error(&rejection.message)),
        )
            .into_response());
    }

    Ok(CurrentUser {
        id: session.user_id,
        email: session.email.unwrap_or_default(),
        access_token: session.access_token,
    })
}

/// Loads the session named by the cookie, refreshing it once if the provider token expired.
/// Sessions that cannot be refreshed are removed.
pub async fn current_session(
    state: &AppState,
    jar: &CookieJar,
) -> Result<Option<CachedSession>, AppError> {
    let Some(session_id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return Ok(None);
    };
    let Some(session) = state.sessions.load_session(&session_id).await? else {
        return Ok(None);
    };

    if !session.is_expired(chrono::Utc::now().timestamp()) {
        return Ok(Some(session));
    }

    match state.provider.refresh_session(&session.refresh_token).await {
        Ok(renewed) => {
            let session = session.refreshed(renewed);
            state
                .sessions
                .save_session(&session, state.config.session_ttl())
                .await?;
            tracing::debug!("Refreshed session for user {}", session.user_id);
            Ok(Some(session))
        }
        Err(e) => {
            tracing::info!("Session refresh failed, signing out: {}", e);
            state.sessions.remove_session(&session_id).await?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{StatusCode, header};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;
    use tower::ServiceExt;

    use crate::cache::CachedSession;
    use crate::test_support::{MockProvider, TestApp, location, session_for, test_app};

    use super::*;

    fn request(path: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(sid) = cookie {
            builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={sid}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn with_session(app: &TestApp, email: &str, expires_at: i64) {
        let mut session = CachedSession::from_provider("sid".into(), session_for(email));
        session.expires_at = expires_at;
        app.sessions.insert_session(session);
    }

    #[derive(Serialize)]
    struct RawClaims<'a> {
        sub: &'a str,
        email: &'a str,
        exp: i64,
        aud: &'a str,
    }

    fn bearer(secret: &str, email: &str) -> String {
        let claims = RawClaims {
            sub: "6f1c2a4e-3b1d-4d6e-9a51-1e2f3a4b5c6d",
            email,
            exp: chrono::Utc::now().timestamp() + 600,
            aud: "authenticated",
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn missing_session_is_unauthorized() {
        let app = test_app(MockProvider::signing_in("student@nits.ac.in"));
        let response = app.router.oneshot(request("/api/users/me", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_session_id_is_unauthorized() {
        let app = test_app(MockProvider::signing_in("student@nits.ac.in"));
        let response = app
            .router
            .oneshot(request("/api/users/me", Some("nope")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn outside_domain_session_is_signed_out_and_redirected() {
        let app = test_app(MockProvider::signing_in("student@other.edu"));
        with_session(&app, "student@other.edu", chrono::Utc::now().timestamp() + 600);

        let response = app
            .router
            .clone()
            .oneshot(request("/api/users/me", Some("sid")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).unwrap().starts_with("/auth/login?error="));
        assert!(app.sessions.session("sid").is_none());
        assert_eq!(app.provider.sign_out_calls(), 1);
    }

    #[tokio::test]
    async fn expired_session_that_cannot_refresh_is_removed() {
        let app = test_app(MockProvider::rejecting("Invalid Refresh Token"));
        with_session(&app, "student@nits.ac.in", chrono::Utc::now().timestamp() - 10);

        let response = app
            .router
            .clone()
            .oneshot(request("/api/users/me", Some("sid")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(app.provider.refresh_calls(), 1);
        assert!(app.sessions.session("sid").is_none());
    }

    #[tokio::test]
    async fn current_session_refreshes_expired_tokens() {
        let app = test_app(MockProvider::signing_in("student@nits.ac.in"));
        with_session(&app, "student@nits.ac.in", chrono::Utc::now().timestamp() - 10);

        let response = app
            .router
            .clone()
            .oneshot(request("/api/auth/session", Some("sid")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.provider.refresh_calls(), 1);
        let stored = app.sessions.session("sid").unwrap();
        assert!(stored.expires_at > chrono::Utc::now().timestamp());
    }

    #[tokio::test]
    async fn bearer_outside_domain_is_forbidden() {
        let app = test_app(MockProvider::signing_in("student@nits.ac.in"));
        let token = bearer(&app.config.provider_jwt_secret, "student@other.edu");
        let response = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/users/me")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn bearer_with_wrong_signature_is_unauthorized() {
        let app = test_app(MockProvider::signing_in("student@nits.ac.in"));
        let token = bearer("not-the-secret", "student@nits.ac.in");
        let response = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/users/me")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
