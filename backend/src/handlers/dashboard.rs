//! Dashboard handlers

use axum::{extract::State, Json};

use shared::{Action, Resource};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::dashboard::DashboardSummary;
use crate::services::DashboardService;
use crate::AppState;

/// Fleet headline figures, for anyone who can see part of the fleet
pub async fn get_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<DashboardSummary>, AppError> {
    let viewable = [
        (Resource::Vehicle, Action::View),
        (Resource::Driver, Action::View),
        (Resource::Agreement, Action::View),
    ];
    if !user.has_any_permission(&viewable) {
        return Err(AppError::InsufficientPermissions);
    }

    let summary = DashboardService::new(state.db.clone()).summary().await?;
    Ok(Json(summary))
}
