use axum::{
    extract::{Extension, Json, Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult},
    middleware::CurrentUser,
    utils::success_to_api_response,
};

use super::model::{ProfileResponse, PublicProfile, UpdateProfileRequest, UserProfile};

pub async fn get_me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<impl IntoResponse> {
    let profile = UserProfile::find_or_create(&state.pool, user.id, &user.email).await?;
    Ok(success_to_api_response(ProfileResponse::from(profile)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    let req = req.normalized().map_err(AppError::Validation)?;

    // the row may not exist yet if the profile page was never opened
    UserProfile::find_or_create(&state.pool, user.id, &user.email).await?;
    let profile = UserProfile::update(&state.pool, user.id, &req).await?;

    tracing::info!("Updated profile of user {}", user.id);
    Ok(success_to_api_response(ProfileResponse::from(profile)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let profile = PublicProfile::find(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(success_to_api_response(profile))
}
