//! Inspection HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared::{Action, EntityType, PaginatedResponse, Resource};

use crate::error::AppError;
use crate::handlers::attachment::purge_attachments;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::inspection::{
    CreateInspectionInput, Inspection, InspectionQuery, UpdateInspectionInput,
};
use crate::services::{Actor, InspectionService};
use crate::AppState;

pub async fn list_inspections(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<InspectionQuery>,
) -> Result<Json<PaginatedResponse<Inspection>>, AppError> {
    user.require(Resource::Inspection, Action::View)?;

    let inspections = InspectionService::new(state.db.clone())
        .list_inspections(&query)
        .await?;
    Ok(Json(inspections))
}

pub async fn get_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(inspection_id): Path<Uuid>,
) -> Result<Json<Inspection>, AppError> {
    user.require(Resource::Inspection, Action::View)?;

    let inspection = InspectionService::new(state.db.clone())
        .get_inspection(inspection_id)
        .await?;
    Ok(Json(inspection))
}

/// Record an inspection; the vehicle's odometer and status follow it
pub async fn create_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<CreateInspectionInput>,
) -> Result<(StatusCode, Json<Inspection>), AppError> {
    user.require(Resource::Inspection, Action::Create)?;

    let inspection = InspectionService::new(state.db.clone())
        .create_inspection(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(inspection)))
}

pub async fn update_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(inspection_id): Path<Uuid>,
    Json(input): Json<UpdateInspectionInput>,
) -> Result<Json<Inspection>, AppError> {
    user.require(Resource::Inspection, Action::Edit)?;

    let inspection = InspectionService::new(state.db.clone())
        .update_inspection(&Actor::user(user.user_id, client.ip), inspection_id, input)
        .await?;
    Ok(Json(inspection))
}

pub async fn delete_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(inspection_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Inspection, Action::Delete)?;

    InspectionService::new(state.db.clone())
        .delete_inspection(&Actor::user(user.user_id, client.ip), inspection_id)
        .await?;
    purge_attachments(&state, EntityType::Inspection, inspection_id).await;

    Ok(StatusCode::NO_CONTENT)
}
