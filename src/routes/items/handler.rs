use axum::{
    extract::{Extension, Json, Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult},
    middleware::CurrentUser,
    routes::users::UserProfile,
    utils::success_to_api_response,
};

use super::model::{
    CreateItemRequest, DeleteItemResponse, ItemChanges, ItemFilter, ItemWithSeller,
    UpdateItemRequest,
};

fn not_found() -> AppError {
    AppError::NotFound("Item not found".into())
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(filter): Query<ItemFilter>,
) -> AppResult<impl IntoResponse> {
    filter.validate().map_err(AppError::Validation)?;
    let items = ItemWithSeller::list(&state.pool, &filter).await?;
    Ok(success_to_api_response(items))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let item = ItemWithSeller::find(&state.pool, id)
        .await?
        .ok_or_else(not_found)?;
    Ok(success_to_api_response(item))
}

pub async fn my_items(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<ItemFilter>,
) -> AppResult<impl IntoResponse> {
    let filter = ItemFilter {
        user_id: Some(user.id),
        ..filter
    };
    filter.validate().map_err(AppError::Validation)?;
    let items = ItemWithSeller::list(&state.pool, &filter).await?;
    Ok(success_to_api_response(items))
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateItemRequest>,
) -> AppResult<impl IntoResponse> {
    let item = req.validate().map_err(AppError::Validation)?;

    // listings reference the seller's profile row
    UserProfile::find_or_create(&state.pool, user.id, &user.email).await?;
    let created = ItemWithSeller::create(&state.pool, user.id, item).await?;

    tracing::info!("User {} listed item {}", user.id, created.item.id);
    Ok(success_to_api_response(created))
}

pub async fn update_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> AppResult<impl IntoResponse> {
    let current = ItemWithSeller::find_owned(&state.pool, id, user.id)
        .await?
        .ok_or_else(not_found)?;

    let changes = ItemChanges::diff(&current.item, req).map_err(AppError::Validation)?;
    if changes.is_empty() {
        tracing::debug!("Edit of item {} changed nothing", id);
        return Ok(success_to_api_response(current));
    }

    let updated = ItemWithSeller::update(&state.pool, id, user.id, &changes)
        .await?
        .ok_or_else(not_found)?;
    tracing::info!("User {} updated item {}", user.id, id);
    Ok(success_to_api_response(updated))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    if !ItemWithSeller::delete(&state.pool, id, user.id).await? {
        return Err(not_found());
    }
    tracing::info!("User {} deleted item {}", user.id, id);
    Ok(success_to_api_response(DeleteItemResponse { id }))
}
