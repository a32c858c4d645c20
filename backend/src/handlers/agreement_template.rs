//! Agreement template handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{Action, Resource};

use crate::error::AppError;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::agreement_template::{
    AgreementFields, AgreementTemplate, CreateTemplateInput, TemplatePreview, UpdateTemplateInput,
};
use crate::services::{Actor, AgreementTemplateService};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TemplateListQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_templates(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<TemplateListQuery>,
) -> Result<Json<Vec<AgreementTemplate>>, AppError> {
    user.require(Resource::AgreementTemplate, Action::View)?;

    let templates = AgreementTemplateService::new(state.db.clone())
        .list_templates(query.active_only)
        .await?;
    Ok(Json(templates))
}

pub async fn get_template(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(template_id): Path<Uuid>,
) -> Result<Json<AgreementTemplate>, AppError> {
    user.require(Resource::AgreementTemplate, Action::View)?;

    let template = AgreementTemplateService::new(state.db.clone())
        .get_template(template_id)
        .await?;
    Ok(Json(template))
}

pub async fn create_template(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<CreateTemplateInput>,
) -> Result<(StatusCode, Json<AgreementTemplate>), AppError> {
    user.require(Resource::AgreementTemplate, Action::Create)?;

    let template = AgreementTemplateService::new(state.db.clone())
        .create_template(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn update_template(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(template_id): Path<Uuid>,
    Json(input): Json<UpdateTemplateInput>,
) -> Result<Json<AgreementTemplate>, AppError> {
    user.require(Resource::AgreementTemplate, Action::Edit)?;

    let template = AgreementTemplateService::new(state.db.clone())
        .update_template(&Actor::user(user.user_id, client.ip), template_id, input)
        .await?;
    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(template_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::AgreementTemplate, Action::Delete)?;

    AgreementTemplateService::new(state.db.clone())
        .delete_template(&Actor::user(user.user_id, client.ip), template_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Render a template against a real driver and vehicle
pub async fn preview_template(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(template_id): Path<Uuid>,
    Json(fields): Json<AgreementFields>,
) -> Result<Json<TemplatePreview>, AppError> {
    user.require(Resource::AgreementTemplate, Action::View)?;

    let preview = AgreementTemplateService::new(state.db.clone())
        .preview_template(template_id, &fields)
        .await?;
    Ok(Json(preview))
}
