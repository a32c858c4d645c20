//! User administration handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared::{Action, PaginatedResponse, Resource};

use crate::error::AppError;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::user::{
    CreateUserInput, ResetPasswordInput, UpdateUserInput, UserAccount, UserQuery,
};
use crate::services::{Actor, UserService};
use crate::AppState;

/// List users
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<PaginatedResponse<UserAccount>>, AppError> {
    user.require(Resource::User, Action::View)?;

    let users = UserService::new(state.db.clone()).list_users(&query).await?;
    Ok(Json(users))
}

/// Get a user
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserAccount>, AppError> {
    user.require(Resource::User, Action::View)?;

    let account = UserService::new(state.db.clone()).get_user(user_id).await?;
    Ok(Json(account))
}

/// Create a user
pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<UserAccount>), AppError> {
    user.require(Resource::User, Action::Create)?;

    let account = UserService::new(state.db.clone())
        .create_user(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// Update a user
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<UserAccount>, AppError> {
    user.require(Resource::User, Action::Edit)?;

    let account = UserService::new(state.db.clone())
        .update_user(&Actor::user(user.user_id, client.ip), user_id, input)
        .await?;
    Ok(Json(account))
}

/// Set a new password for a user
pub async fn reset_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(user_id): Path<Uuid>,
    Json(input): Json<ResetPasswordInput>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::User, Action::Edit)?;

    UserService::new(state.db.clone())
        .reset_password(&Actor::user(user.user_id, client.ip), user_id, input)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a user
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::User, Action::Delete)?;

    UserService::new(state.db.clone())
        .delete_user(&Actor::user(user.user_id, client.ip), user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
