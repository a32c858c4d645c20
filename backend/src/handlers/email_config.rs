//! SMTP configuration handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared::{Action, Resource};

use crate::error::AppError;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::email_config::{
    CreateEmailConfigInput, EmailConfig, TestEmailInput, UpdateEmailConfigInput,
};
use crate::services::{Actor, EmailConfigService};
use crate::AppState;

pub async fn list_email_configs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<EmailConfig>>, AppError> {
    user.require(Resource::EmailConfig, Action::View)?;

    let configs = EmailConfigService::new(state.db.clone())
        .list_configs()
        .await?;
    Ok(Json(configs))
}

pub async fn get_email_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(config_id): Path<Uuid>,
) -> Result<Json<EmailConfig>, AppError> {
    user.require(Resource::EmailConfig, Action::View)?;

    let config = EmailConfigService::new(state.db.clone())
        .get_config(config_id)
        .await?;
    Ok(Json(config))
}

pub async fn create_email_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<CreateEmailConfigInput>,
) -> Result<(StatusCode, Json<EmailConfig>), AppError> {
    user.require(Resource::EmailConfig, Action::Create)?;

    let config = EmailConfigService::new(state.db.clone())
        .create_config(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn update_email_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(config_id): Path<Uuid>,
    Json(input): Json<UpdateEmailConfigInput>,
) -> Result<Json<EmailConfig>, AppError> {
    user.require(Resource::EmailConfig, Action::Edit)?;

    let config = EmailConfigService::new(state.db.clone())
        .update_config(&Actor::user(user.user_id, client.ip), config_id, input)
        .await?;
    Ok(Json(config))
}

/// Make a configuration the one used for outgoing mail
pub async fn activate_email_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(config_id): Path<Uuid>,
) -> Result<Json<EmailConfig>, AppError> {
    user.require(Resource::EmailConfig, Action::Edit)?;

    let config = EmailConfigService::new(state.db.clone())
        .activate_config(&Actor::user(user.user_id, client.ip), config_id)
        .await?;
    Ok(Json(config))
}

pub async fn delete_email_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(config_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::EmailConfig, Action::Delete)?;

    EmailConfigService::new(state.db.clone())
        .delete_config(&Actor::user(user.user_id, client.ip), config_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_test_email(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<TestEmailInput>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::EmailConfig, Action::Edit)?;

    EmailConfigService::new(state.db.clone())
        .send_test_email(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
