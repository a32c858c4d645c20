//! Contractor vehicle compliance: weekly checks and status

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use shared::{
    build_history, compliance_percent, current_streak, recent_weeks, validate_checklist,
    week_end, week_label, week_start, ChecklistItem, Ownership, PaginatedResponse, Pagination,
    VehicleStatus, WeekMarker,
};

use crate::error::{AppError, AppResult};
use crate::services::audit::{self, Actor, AuditEvent};

/// Default and maximum number of weeks in a vehicle history
const DEFAULT_HISTORY_WEEKS: u32 = 12;
const MAX_HISTORY_WEEKS: u32 = 104;

/// Compliance service
#[derive(Clone)]
pub struct ComplianceService {
    db: PgPool,
}

/// A weekly check of a contractor vehicle
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ComplianceCheck {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub vehicle_registration: String,
    pub week_start: NaiveDate,
    pub week_label: String,
    pub check_date: NaiveDate,
    pub checked_by: Option<Uuid>,
    pub checked_by_name: Option<String>,
    pub checklist: Json<Vec<ChecklistItem>>,
    pub passed: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filters for listing checks
#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    pub vehicle_id: Option<Uuid>,
    /// Any date in the week of interest
    #[serde(alias = "week")]
    pub week_start: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Input for recording a check
#[derive(Debug, Deserialize)]
pub struct RecordCheckInput {
    pub vehicle_id: Uuid,
    /// Defaults to today
    pub check_date: Option<NaiveDate>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    /// Derived from the checklist when omitted
    pub passed: Option<bool>,
    pub notes: Option<String>,
}

/// One contractor vehicle's standing for a week
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct VehicleWeekStatus {
    pub vehicle_id: Uuid,
    pub registration: String,
    pub make: String,
    pub model: String,
    pub contractor_name: Option<String>,
    pub check_id: Option<Uuid>,
    pub check_date: Option<NaiveDate>,
    pub passed: Option<bool>,
}

/// Fleet-wide compliance for a week
#[derive(Debug, Serialize)]
pub struct WeeklyStatus {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub week_label: String,
    pub total_vehicles: i64,
    pub checked: i64,
    pub missing: i64,
    pub failed: i64,
    pub compliance_percent: Decimal,
    pub vehicles: Vec<VehicleWeekStatus>,
}

/// A vehicle's recent weeks, newest first
#[derive(Debug, Serialize)]
pub struct VehicleHistory {
    pub vehicle_id: Uuid,
    pub registration: String,
    pub weeks: Vec<WeekMarker>,
    pub checked_weeks: usize,
    pub current_streak: u32,
}

const CHECK_SELECT: &str = r#"
    SELECT c.id, c.vehicle_id, v.registration AS vehicle_registration, c.week_start,
           to_char(c.week_start, 'IYYY-"W"IW') AS week_label, c.check_date, c.checked_by,
           u.name AS checked_by_name, c.checklist, c.passed, c.notes, c.created_at
    FROM contractor_vehicle_checks c
    JOIN vehicles v ON v.id = c.vehicle_id
    LEFT JOIN users u ON u.id = c.checked_by
"#;

/// Resolve whether a check passed from its checklist and the stated outcome
fn check_outcome(checklist: &[ChecklistItem], stated: Option<bool>) -> AppResult<bool> {
    if !checklist.is_empty() {
        validate_checklist(checklist).map_err(|msg| AppError::validation("checklist", msg))?;
    }
    match stated {
        Some(passed) => Ok(passed),
        None if checklist.is_empty() => Err(AppError::validation(
            "passed",
            "State whether the check passed or provide a checklist",
        )),
        None => Ok(checklist.iter().all(|i| i.passed)),
    }
}

impl ComplianceService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record this week's check for a contractor vehicle
    pub async fn record_check(
        &self,
        actor: &Actor,
        input: RecordCheckInput,
    ) -> AppResult<ComplianceCheck> {
        let passed = check_outcome(&input.checklist, input.passed)?;

        let today = Utc::now().date_naive();
        let check_date = input.check_date.unwrap_or(today);
        if check_date > today {
            return Err(AppError::validation(
                "check_date",
                "Check date cannot be in the future",
            ));
        }
        let week = week_start(check_date);

        let (ownership, status) = sqlx::query_as::<_, (String, String)>(
            "SELECT ownership, status FROM vehicles WHERE id = $1",
        )
        .bind(input.vehicle_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::validation("vehicle_id", "Vehicle does not exist"))?;

        if ownership != Ownership::Contractor.as_str() {
            return Err(AppError::validation(
                "vehicle_id",
                "Only contractor vehicles have weekly checks",
            ));
        }
        if status == VehicleStatus::Retired.as_str() {
            return Err(AppError::validation("vehicle_id", "Vehicle is retired"));
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM contractor_vehicle_checks WHERE vehicle_id = $1 AND week_start = $2)",
        )
        .bind(input.vehicle_id)
        .bind(week)
        .fetch_one(&self.db)
        .await?;
        if exists {
            return Err(AppError::conflict(
                "week_start",
                format!("Vehicle already checked for week {}", week_label(week)),
            ));
        }

        let mut tx = self.db.begin().await?;

        let check_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO contractor_vehicle_checks (
                vehicle_id, week_start, check_date, checked_by, checklist, passed, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(input.vehicle_id)
        .bind(week)
        .bind(check_date)
        .bind(actor.user_id)
        .bind(Json(&input.checklist))
        .bind(passed)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "compliance_check", check_id).with_details(json!({
                "vehicle_id": input.vehicle_id,
                "week": week_label(week),
                "passed": passed,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            check_id = %check_id,
            vehicle_id = %input.vehicle_id,
            week = %week_label(week),
            passed,
            "Compliance check recorded"
        );
        self.get_check(check_id).await
    }

    pub async fn list_checks(
        &self,
        query: &CheckQuery,
    ) -> AppResult<PaginatedResponse<ComplianceCheck>> {
        let pagination = Pagination::from_query(query.page, query.per_page);
        let week = query.week_start.map(week_start);

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM contractor_vehicle_checks c
            WHERE ($1::uuid IS NULL OR c.vehicle_id = $1)
              AND ($2::date IS NULL OR c.week_start = $2)
            "#,
        )
        .bind(query.vehicle_id)
        .bind(week)
        .fetch_one(&self.db)
        .await?;

        let sql = format!(
            r#"{}
            WHERE ($1::uuid IS NULL OR c.vehicle_id = $1)
              AND ($2::date IS NULL OR c.week_start = $2)
            ORDER BY c.week_start DESC, v.registration ASC
            LIMIT $3 OFFSET $4
            "#,
            CHECK_SELECT
        );
        let checks = sqlx::query_as::<_, ComplianceCheck>(&sql)
            .bind(query.vehicle_id)
            .bind(week)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(checks, &pagination, total))
    }

    pub async fn get_check(&self, check_id: Uuid) -> AppResult<ComplianceCheck> {
        let sql = format!("{} WHERE c.id = $1", CHECK_SELECT);
        sqlx::query_as::<_, ComplianceCheck>(&sql)
            .bind(check_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Compliance check".to_string()))
    }

    pub async fn delete_check(&self, actor: &Actor, check_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let (vehicle_id, week) = sqlx::query_as::<_, (Uuid, NaiveDate)>(
            "DELETE FROM contractor_vehicle_checks WHERE id = $1 RETURNING vehicle_id, week_start",
        )
        .bind(check_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Compliance check".to_string()))?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "compliance_check", check_id)
                .with_details(json!({"vehicle_id": vehicle_id, "week": week_label(week)})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(check_id = %check_id, "Compliance check deleted");
        Ok(())
    }

    /// Every active contractor vehicle with its check for the week containing
    /// `date` (the current week by default)
    pub async fn weekly_status(&self, date: Option<NaiveDate>) -> AppResult<WeeklyStatus> {
        let week = week_start(date.unwrap_or_else(|| Utc::now().date_naive()));

        let vehicles = sqlx::query_as::<_, VehicleWeekStatus>(
            r#"
            SELECT v.id AS vehicle_id, v.registration, v.make, v.model, v.contractor_name,
                   c.id AS check_id, c.check_date, c.passed
            FROM vehicles v
            LEFT JOIN contractor_vehicle_checks c
                   ON c.vehicle_id = v.id AND c.week_start = $1
            WHERE v.ownership = 'contractor' AND v.status <> 'retired'
            ORDER BY (c.id IS NOT NULL), v.registration
            "#,
        )
        .bind(week)
        .fetch_all(&self.db)
        .await?;

        let total = vehicles.len() as i64;
        let checked = vehicles.iter().filter(|v| v.check_id.is_some()).count() as i64;
        let failed = vehicles.iter().filter(|v| v.passed == Some(false)).count() as i64;

        Ok(WeeklyStatus {
            week_start: week,
            week_end: week_end(week),
            week_label: week_label(week),
            total_vehicles: total,
            checked,
            missing: total - checked,
            failed,
            compliance_percent: compliance_percent(checked, total),
            vehicles,
        })
    }

    /// Checked or missing markers for a vehicle's recent weeks and its
    /// current streak
    pub async fn vehicle_history(
        &self,
        vehicle_id: Uuid,
        weeks: Option<u32>,
    ) -> AppResult<VehicleHistory> {
        let count = weeks
            .unwrap_or(DEFAULT_HISTORY_WEEKS)
            .clamp(1, MAX_HISTORY_WEEKS);

        let (registration, ownership) = sqlx::query_as::<_, (String, String)>(
            "SELECT registration, ownership FROM vehicles WHERE id = $1",
        )
        .bind(vehicle_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))?;

        if ownership != Ownership::Contractor.as_str() {
            return Err(AppError::validation(
                "vehicle_id",
                "Only contractor vehicles have weekly checks",
            ));
        }

        let today = Utc::now().date_naive();
        let week_starts = recent_weeks(today, count);
        let oldest = week_starts
            .last()
            .copied()
            .unwrap_or_else(|| week_start(today));

        let checks = sqlx::query_as::<_, (NaiveDate, bool)>(
            r#"
            SELECT week_start, passed FROM contractor_vehicle_checks
            WHERE vehicle_id = $1 AND week_start >= $2
            "#,
        )
        .bind(vehicle_id)
        .bind(oldest)
        .fetch_all(&self.db)
        .await?;

        let history = build_history(&week_starts, &checks);
        Ok(VehicleHistory {
            vehicle_id,
            registration,
            checked_weeks: history.iter().filter(|w| w.checked).count(),
            current_streak: current_streak(&history),
            weeks: history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, passed: bool) -> ChecklistItem {
        ChecklistItem {
            item: name.to_string(),
            passed,
            notes: None,
        }
    }

    #[test]
    fn test_outcome_from_checklist() {
        assert!(check_outcome(&[item("Tyres", true), item("Lights", true)], None).unwrap());
        assert!(!check_outcome(&[item("Tyres", true), item("Lights", false)], None).unwrap());
    }

    #[test]
    fn test_stated_outcome_wins() {
        assert!(check_outcome(&[item("Tyres", false)], Some(true)).unwrap());
        assert!(!check_outcome(&[], Some(false)).unwrap());
    }

    #[test]
    fn test_outcome_needs_something() {
        assert!(matches!(
            check_outcome(&[], None),
            Err(AppError::Validation { field, .. }) if field == "passed"
        ));
        assert!(matches!(
            check_outcome(&[item("Tyres", true), item("tyres", true)], None),
            Err(AppError::Validation { field, .. }) if field == "checklist"
        ));
    }
}
