//! Vehicle inspection service

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{types::Json, PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    derive_result, validate_checklist, validate_odometer, ChecklistItem, InspectionResult,
    InspectionType, PaginatedResponse, Pagination, VehicleStatus,
};

use crate::error::{AppError, AppResult};
use crate::services::audit::{self, Actor, AuditEvent};

/// Inspection service
#[derive(Clone)]
pub struct InspectionService {
    db: PgPool,
}

/// Inspection record
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Inspection {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub vehicle_registration: String,
    pub inspector_id: Option<Uuid>,
    pub inspector_name: Option<String>,
    pub inspection_type: String,
    pub inspection_date: NaiveDate,
    pub odometer: Option<Decimal>,
    pub checklist: Json<Vec<ChecklistItem>>,
    pub result: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for listing inspections
#[derive(Debug, Default, Deserialize)]
pub struct InspectionQuery {
    pub vehicle_id: Option<Uuid>,
    pub result: Option<InspectionResult>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Input for recording an inspection
#[derive(Debug, Deserialize)]
pub struct CreateInspectionInput {
    pub vehicle_id: Uuid,
    #[serde(default)]
    pub inspection_type: InspectionType,
    pub inspection_date: Option<NaiveDate>,
    pub odometer: Option<Decimal>,
    pub checklist: Vec<ChecklistItem>,
    /// Only `advisory` overrides the checklist outcome
    pub result: Option<InspectionResult>,
    pub notes: Option<String>,
}

/// Input for correcting an inspection
#[derive(Debug, Default, Deserialize)]
pub struct UpdateInspectionInput {
    pub inspection_type: Option<InspectionType>,
    pub inspection_date: Option<NaiveDate>,
    pub odometer: Option<Decimal>,
    pub checklist: Option<Vec<ChecklistItem>>,
    pub result: Option<InspectionResult>,
    pub notes: Option<String>,
}

const INSPECTION_SELECT: &str = r#"
    SELECT i.id, i.vehicle_id, v.registration AS vehicle_registration, i.inspector_id,
           u.name AS inspector_name, i.inspection_type, i.inspection_date, i.odometer,
           i.checklist, i.result, i.notes, i.created_at, i.updated_at
    FROM inspections i
    JOIN vehicles v ON v.id = i.vehicle_id
    LEFT JOIN users u ON u.id = i.inspector_id
"#;

const INSPECTION_FILTER: &str = r#"
    WHERE ($1::uuid IS NULL OR i.vehicle_id = $1)
      AND ($2::text IS NULL OR i.result = $2)
      AND ($3::date IS NULL OR i.inspection_date >= $3)
      AND ($4::date IS NULL OR i.inspection_date <= $4)
"#;

/// Apply an inspection's consequences to its vehicle: a higher odometer
/// reading is recorded, and a failure takes an available vehicle off the road
async fn apply_to_vehicle(
    conn: &mut PgConnection,
    vehicle_id: Uuid,
    odometer: Option<Decimal>,
    result: InspectionResult,
) -> AppResult<()> {
    let (status, current_odometer) = sqlx::query_as::<_, (String, Option<Decimal>)>(
        "SELECT status, odometer FROM vehicles WHERE id = $1 FOR UPDATE",
    )
    .bind(vehicle_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::validation("vehicle_id", "Vehicle does not exist"))?;

    if let Some(reading) = odometer {
        validate_odometer(reading, current_odometer)
            .map_err(|msg| AppError::validation("odometer", msg))?;
    }

    let status: VehicleStatus = status.parse().map_err(AppError::Internal)?;
    let next = if result == InspectionResult::Fail {
        status.after_failed_inspection()
    } else {
        status
    };

    sqlx::query(
        r#"
        UPDATE vehicles SET
            odometer = GREATEST(odometer, $2::numeric),
            status = $3,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(vehicle_id)
    .bind(odometer)
    .bind(next.as_str())
    .execute(&mut *conn)
    .await?;

    if next != status {
        tracing::info!(
            vehicle_id = %vehicle_id,
            from = status.as_str(),
            to = next.as_str(),
            "Vehicle status changed by failed inspection"
        );
    }
    Ok(())
}

impl InspectionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_inspections(
        &self,
        query: &InspectionQuery,
    ) -> AppResult<PaginatedResponse<Inspection>> {
        let pagination = Pagination::from_query(query.page, query.per_page);
        let result = query.result.map(|r| r.as_str());

        let count_sql = format!("SELECT COUNT(*) FROM inspections i {}", INSPECTION_FILTER);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(query.vehicle_id)
            .bind(result)
            .bind(query.from)
            .bind(query.to)
            .fetch_one(&self.db)
            .await?;

        let sql = format!(
            "{} {} ORDER BY i.inspection_date DESC, i.created_at DESC LIMIT $5 OFFSET $6",
            INSPECTION_SELECT, INSPECTION_FILTER
        );
        let inspections = sqlx::query_as::<_, Inspection>(&sql)
            .bind(query.vehicle_id)
            .bind(result)
            .bind(query.from)
            .bind(query.to)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(inspections, &pagination, total))
    }

    pub async fn get_inspection(&self, inspection_id: Uuid) -> AppResult<Inspection> {
        let sql = format!("{} WHERE i.id = $1", INSPECTION_SELECT);
        sqlx::query_as::<_, Inspection>(&sql)
            .bind(inspection_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Inspection".to_string()))
    }

    /// Record an inspection and apply it to the vehicle
    pub async fn create_inspection(
        &self,
        actor: &Actor,
        input: CreateInspectionInput,
    ) -> AppResult<Inspection> {
        validate_checklist(&input.checklist).map_err(|msg| AppError::validation("checklist", msg))?;
        let result = derive_result(&input.checklist, input.result);
        let inspection_date = input
            .inspection_date
            .unwrap_or_else(|| Utc::now().date_naive());

        let mut tx = self.db.begin().await?;

        apply_to_vehicle(&mut tx, input.vehicle_id, input.odometer, result).await?;

        let inspection_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO inspections (
                vehicle_id, inspector_id, inspection_type, inspection_date, odometer,
                checklist, result, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(input.vehicle_id)
        .bind(actor.user_id)
        .bind(input.inspection_type.as_str())
        .bind(inspection_date)
        .bind(input.odometer)
        .bind(Json(&input.checklist))
        .bind(result.as_str())
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "inspection", inspection_id).with_details(json!({
                "vehicle_id": input.vehicle_id,
                "result": result,
                "failed_items": input.checklist.iter().filter(|i| !i.passed).count(),
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            inspection_id = %inspection_id,
            vehicle_id = %input.vehicle_id,
            result = result.as_str(),
            "Inspection recorded"
        );
        self.get_inspection(inspection_id).await
    }

    /// Correct an inspection. The result is re-derived from the checklist.
    pub async fn update_inspection(
        &self,
        actor: &Actor,
        inspection_id: Uuid,
        input: UpdateInspectionInput,
    ) -> AppResult<Inspection> {
        let existing = self.get_inspection(inspection_id).await?;

        let checklist = input.checklist.unwrap_or(existing.checklist.0);
        validate_checklist(&checklist).map_err(|msg| AppError::validation("checklist", msg))?;

        let stated = match input.result {
            Some(result) => Some(result),
            None => existing.result.parse().ok(),
        };
        let result = derive_result(&checklist, stated);

        let mut tx = self.db.begin().await?;

        if input.odometer.is_some() || result != existing.result.parse().unwrap_or(result) {
            apply_to_vehicle(&mut tx, existing.vehicle_id, input.odometer, result).await?;
        }

        sqlx::query(
            r#"
            UPDATE inspections SET
                inspection_type = COALESCE($2, inspection_type),
                inspection_date = COALESCE($3, inspection_date),
                odometer = COALESCE($4, odometer),
                checklist = $5,
                result = $6,
                notes = COALESCE($7, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(inspection_id)
        .bind(input.inspection_type.map(|t| t.as_str()))
        .bind(input.inspection_date)
        .bind(input.odometer)
        .bind(Json(&checklist))
        .bind(result.as_str())
        .bind(&input.notes)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("update", "inspection", inspection_id)
                .with_details(json!({"result": result, "previous_result": existing.result})),
        )
        .await?;

        tx.commit().await?;

        self.get_inspection(inspection_id).await
    }

    pub async fn delete_inspection(&self, actor: &Actor, inspection_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let vehicle_id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM inspections WHERE id = $1 RETURNING vehicle_id",
        )
        .bind(inspection_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Inspection".to_string()))?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "inspection", inspection_id)
                .with_details(json!({"vehicle_id": vehicle_id})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(inspection_id = %inspection_id, "Inspection deleted");
        Ok(())
    }
}
