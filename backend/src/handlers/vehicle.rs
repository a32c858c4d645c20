//! Vehicle HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use shared::{Action, PaginatedResponse, Resource};

use crate::error::AppError;
use crate::handlers::attachment::purge_attachments;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::export::{attachment_disposition, export_to_csv};
use crate::services::vehicle::{
    AssignDriverInput, CreateVehicleInput, UpdateVehicleInput, Vehicle, VehicleQuery,
};
use crate::services::{Actor, VehicleService};
use crate::AppState;

/// List vehicles with search, filters and sorting
pub async fn list_vehicles(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<VehicleQuery>,
) -> Result<Json<PaginatedResponse<Vehicle>>, AppError> {
    user.require(Resource::Vehicle, Action::View)?;

    let vehicles = VehicleService::new(state.db.clone())
        .list_vehicles(&query)
        .await?;
    Ok(Json(vehicles))
}

pub async fn get_vehicle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(vehicle_id): Path<Uuid>,
) -> Result<Json<Vehicle>, AppError> {
    user.require(Resource::Vehicle, Action::View)?;

    let vehicle = VehicleService::new(state.db.clone())
        .get_vehicle(vehicle_id)
        .await?;
    Ok(Json(vehicle))
}

pub async fn create_vehicle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<CreateVehicleInput>,
) -> Result<(StatusCode, Json<Vehicle>), AppError> {
    user.require(Resource::Vehicle, Action::Create)?;

    let vehicle = VehicleService::new(state.db.clone())
        .create_vehicle(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub async fn update_vehicle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(vehicle_id): Path<Uuid>,
    Json(input): Json<UpdateVehicleInput>,
) -> Result<Json<Vehicle>, AppError> {
    user.require(Resource::Vehicle, Action::Edit)?;

    let vehicle = VehicleService::new(state.db.clone())
        .update_vehicle(&Actor::user(user.user_id, client.ip), vehicle_id, input)
        .await?;
    Ok(Json(vehicle))
}

pub async fn delete_vehicle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(vehicle_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Vehicle, Action::Delete)?;

    let removed = VehicleService::new(state.db.clone())
        .delete_vehicle(&Actor::user(user.user_id, client.ip), vehicle_id)
        .await?;
    for (entity_type, entity_id) in removed {
        purge_attachments(&state, entity_type, entity_id).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Attach a driver to a vehicle, or detach with `driver_id: null`
pub async fn assign_driver(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(vehicle_id): Path<Uuid>,
    Json(input): Json<AssignDriverInput>,
) -> Result<Json<Vehicle>, AppError> {
    user.require(Resource::Vehicle, Action::Edit)?;

    let vehicle = VehicleService::new(state.db.clone())
        .assign_driver(&Actor::user(user.user_id, client.ip), vehicle_id, input)
        .await?;
    Ok(Json(vehicle))
}

/// Download the filtered vehicle list as CSV
pub async fn export_vehicles_csv(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<VehicleQuery>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Resource::Vehicle, Action::Export)?;

    let rows = VehicleService::new(state.db.clone())
        .export_rows(&query)
        .await?;
    let csv = export_to_csv(&rows)?;

    tracing::info!(user_id = %user.user_id, rows = rows.len(), "Vehicles exported");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                attachment_disposition("vehicles", Utc::now().date_naive()),
            ),
        ],
        csv,
    ))
}
