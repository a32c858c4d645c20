//! Contractor vehicle compliance handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use shared::{Action, EntityType, PaginatedResponse, Resource};

use crate::error::AppError;
use crate::handlers::attachment::purge_attachments;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::compliance::{
    CheckQuery, ComplianceCheck, RecordCheckInput, VehicleHistory, WeeklyStatus,
};
use crate::services::{Actor, ComplianceService};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WeekQuery {
    /// Any date in the week; defaults to the current week
    #[serde(alias = "week")]
    pub week_start: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub weeks: Option<u32>,
}

pub async fn record_check(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<RecordCheckInput>,
) -> Result<(StatusCode, Json<ComplianceCheck>), AppError> {
    user.require(Resource::Compliance, Action::Create)?;

    let check = ComplianceService::new(state.db.clone())
        .record_check(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(check)))
}

pub async fn list_checks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<CheckQuery>,
) -> Result<Json<PaginatedResponse<ComplianceCheck>>, AppError> {
    user.require(Resource::Compliance, Action::View)?;

    let checks = ComplianceService::new(state.db.clone())
        .list_checks(&query)
        .await?;
    Ok(Json(checks))
}

pub async fn get_check(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(check_id): Path<Uuid>,
) -> Result<Json<ComplianceCheck>, AppError> {
    user.require(Resource::Compliance, Action::View)?;

    let check = ComplianceService::new(state.db.clone())
        .get_check(check_id)
        .await?;
    Ok(Json(check))
}

pub async fn delete_check(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(check_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Compliance, Action::Delete)?;

    ComplianceService::new(state.db.clone())
        .delete_check(&Actor::user(user.user_id, client.ip), check_id)
        .await?;
    purge_attachments(&state, EntityType::ComplianceCheck, check_id).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Which contractor vehicles were checked in a week
pub async fn weekly_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<WeekQuery>,
) -> Result<Json<WeeklyStatus>, AppError> {
    user.require(Resource::Compliance, Action::View)?;

    let status = ComplianceService::new(state.db.clone())
        .weekly_status(query.week_start)
        .await?;
    Ok(Json(status))
}

pub async fn vehicle_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(vehicle_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<VehicleHistory>, AppError> {
    user.require(Resource::Compliance, Action::View)?;

    let history = ComplianceService::new(state.db.clone())
        .vehicle_history(vehicle_id, query.weeks)
        .await?;
    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    fn week_of(uri: &'static str) -> Option<NaiveDate> {
        let uri = Uri::from_static(uri);
        Query::<WeekQuery>::try_from_uri(&uri).unwrap().0.week_start
    }

    #[test]
    fn test_week_query_accepts_week_start_and_week() {
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19);
        assert_eq!(week_of("/weekly?week_start=2026-10-19"), monday);
        assert_eq!(week_of("/weekly?week=2026-10-19"), monday);
        assert_eq!(week_of("/weekly"), None);
    }
}
