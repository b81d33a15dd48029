use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiError, SharedState};
use crate::shop::db::{PreferencesPatch, UserPatch};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub(super) async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .call(move |db| db.create_user(&req.name, &req.email, &req.password))
        .await?;
    tracing::info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

pub(super) async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .call(move |db| db.authenticate(&req.email, &req.password))
        .await?;
    Ok(Json(user))
}

pub(super) async fn list_users(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.call(|db| db.list_users()).await?;
    Ok(Json(users))
}

pub(super) async fn get_user(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.db.call(move |db| db.require_user(user_id)).await?;
    Ok(Json(user))
}

pub(super) async fn update_user(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Json(patch): Json<UserPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .call(move |db| db.update_user(user_id, &patch))
        .await?;
    Ok(Json(user))
}

pub(super) async fn update_preferences(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Json(patch): Json<PreferencesPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .call(move |db| db.update_preferences(user_id, &patch))
        .await?;
    Ok(Json(user))
}

pub(super) async fn delete_user(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.call(move |db| db.delete_user(user_id)).await?;
    match deleted {
        true => {
            tracing::info!(user_id, "user deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        false => Err(ApiError::NotFound(format!("User {} not found", user_id))),
    }
}
