use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors},
    routes,
};

/// Multipart overhead allowed on top of five images.
const UPLOAD_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    // sign-in flow, reached by browser navigation rather than the API client
    let callback_routes = Router::new()
        .route("/auth/callback", get(routes::auth::callback))
        .route("/auth/callback/complete", get(routes::auth::callback_page));

    let public_routes = Router::new()
        .route("/ping", get(routes::health::ping))
        .route("/auth/login/{provider}", get(routes::auth::start_oauth))
        .route("/auth/otp", post(routes::auth::send_otp))
        .route("/auth/callback/reconcile", post(routes::auth::reconcile))
        .route("/auth/session", get(routes::auth::current_user))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/items", get(routes::items::list_items))
        .route("/items/{id}", get(routes::items::get_item))
        .route("/users/{id}", get(routes::users::get_user));

    let upload_limit = state.config.max_upload_bytes * routes::uploads::MAX_FILES + UPLOAD_OVERHEAD;
    let protected_routes = Router::new()
        .route("/users/me", get(routes::users::get_me).put(routes::users::update_me))
        .route("/items", post(routes::items::create_item))
        .route("/items/mine", get(routes::items::my_items))
        .route(
            "/items/{id}",
            put(routes::items::update_item).delete(routes::items::delete_item),
        )
        .route(
            "/uploads",
            post(routes::uploads::upload_images).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(callback_routes)
        .nest("/api", Router::new().merge(public_routes).merge(protected_routes))
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}
