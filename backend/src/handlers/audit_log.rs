//! Audit trail handlers

use axum::{
    extract::{Query, State},
    Json,
};

use shared::{Action, PaginatedResponse, Resource};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::audit::{AuditLog, AuditLogQuery};
use crate::services::AuditService;
use crate::AppState;

pub async fn list_audit_logs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<PaginatedResponse<AuditLog>>, AppError> {
    user.require(Resource::AuditLog, Action::View)?;

    let logs = AuditService::new(state.db.clone()).list(&query).await?;
    Ok(Json(logs))
}
