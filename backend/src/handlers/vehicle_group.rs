//! Vehicle group handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared::{Action, Resource};

use crate::error::AppError;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::vehicle_group::{CreateGroupInput, UpdateGroupInput, VehicleGroup};
use crate::services::{Actor, VehicleGroupService};
use crate::AppState;

pub async fn list_groups(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<VehicleGroup>>, AppError> {
    user.require(Resource::VehicleGroup, Action::View)?;

    let groups = VehicleGroupService::new(state.db.clone()).list_groups().await?;
    Ok(Json(groups))
}

pub async fn get_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(group_id): Path<Uuid>,
) -> Result<Json<VehicleGroup>, AppError> {
    user.require(Resource::VehicleGroup, Action::View)?;

    let group = VehicleGroupService::new(state.db.clone()).get_group(group_id).await?;
    Ok(Json(group))
}

pub async fn create_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<CreateGroupInput>,
) -> Result<(StatusCode, Json<VehicleGroup>), AppError> {
    user.require(Resource::VehicleGroup, Action::Create)?;

    let group = VehicleGroupService::new(state.db.clone())
        .create_group(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn update_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(group_id): Path<Uuid>,
    Json(input): Json<UpdateGroupInput>,
) -> Result<Json<VehicleGroup>, AppError> {
    user.require(Resource::VehicleGroup, Action::Edit)?;

    let group = VehicleGroupService::new(state.db.clone())
        .update_group(&Actor::user(user.user_id, client.ip), group_id, input)
        .await?;
    Ok(Json(group))
}

/// Delete a group; its vehicles stay, ungrouped
pub async fn delete_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::VehicleGroup, Action::Delete)?;

    VehicleGroupService::new(state.db.clone())
        .delete_group(&Actor::user(user.user_id, client.ip), group_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
