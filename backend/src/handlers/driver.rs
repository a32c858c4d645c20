//! Driver HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use shared::{Action, EntityType, PaginatedResponse, Resource};

use crate::error::AppError;
use crate::handlers::attachment::purge_attachments;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::driver::{
    CreateDriverInput, Driver, DriverQuery, ExpiringLicence, UpdateDriverInput,
};
use crate::services::export::{attachment_disposition, export_to_csv};
use crate::services::{Actor, DriverService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub within_days: Option<i64>,
}

pub async fn list_drivers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DriverQuery>,
) -> Result<Json<PaginatedResponse<Driver>>, AppError> {
    user.require(Resource::Driver, Action::View)?;

    let drivers = DriverService::new(state.db.clone())
        .list_drivers(&query)
        .await?;
    Ok(Json(drivers))
}

pub async fn get_driver(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(driver_id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    user.require(Resource::Driver, Action::View)?;

    let driver = DriverService::new(state.db.clone())
        .get_driver(driver_id)
        .await?;
    Ok(Json(driver))
}

pub async fn create_driver(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<CreateDriverInput>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    user.require(Resource::Driver, Action::Create)?;

    let driver = DriverService::new(state.db.clone())
        .create_driver(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

pub async fn update_driver(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(driver_id): Path<Uuid>,
    Json(input): Json<UpdateDriverInput>,
) -> Result<Json<Driver>, AppError> {
    user.require(Resource::Driver, Action::Edit)?;

    let driver = DriverService::new(state.db.clone())
        .update_driver(&Actor::user(user.user_id, client.ip), driver_id, input)
        .await?;
    Ok(Json(driver))
}

pub async fn delete_driver(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(driver_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Driver, Action::Delete)?;

    DriverService::new(state.db.clone())
        .delete_driver(&Actor::user(user.user_id, client.ip), driver_id)
        .await?;
    purge_attachments(&state, EntityType::Driver, driver_id).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Active drivers whose licence has expired or expires within the window
pub async fn expiring_licences(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<Vec<ExpiringLicence>>, AppError> {
    user.require(Resource::Driver, Action::View)?;

    let drivers = DriverService::new(state.db.clone())
        .expiring_licences(query.within_days)
        .await?;
    Ok(Json(drivers))
}

/// Download the filtered driver list as CSV
pub async fn export_drivers_csv(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DriverQuery>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Resource::Driver, Action::Export)?;

    let rows = DriverService::new(state.db.clone())
        .export_rows(&query)
        .await?;
    let csv = export_to_csv(&rows)?;

    tracing::info!(user_id = %user.user_id, rows = rows.len(), "Drivers exported");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                attachment_disposition("drivers", Utc::now().date_naive()),
            ),
        ],
        csv,
    ))
}
