//! Vehicle service: fleet register, driver assignment and export

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::rust::double_option;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    normalize_registration, search_pattern, validate_odometer, validate_registration,
    validate_vehicle_year, validate_vin, EntityType, FuelType, Ownership, PaginatedResponse,
    Pagination, SortDirection, VehicleStatus,
};

use crate::error::{AppError, AppResult};
use crate::services::audit::{self, Actor, AuditEvent};
use crate::services::export::CsvRow;

/// Vehicle service
#[derive(Clone)]
pub struct VehicleService {
    db: PgPool,
}

/// Vehicle with its group and current driver names
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub registration: String,
    pub vin: Option<String>,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
    pub colour: Option<String>,
    pub fuel_type: Option<String>,
    pub ownership: String,
    pub contractor_name: Option<String>,
    pub status: String,
    pub group_id: Option<Uuid>,
    pub group_name: Option<String>,
    pub current_driver_id: Option<Uuid>,
    pub current_driver_name: Option<String>,
    pub odometer: Option<Decimal>,
    pub registration_expiry: Option<NaiveDate>,
    pub insurance_expiry: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flat row for CSV export
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct VehicleExportRow {
    pub registration: String,
    pub vin: Option<String>,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
    pub fuel_type: Option<String>,
    pub ownership: String,
    pub contractor_name: Option<String>,
    pub status: String,
    pub group_name: Option<String>,
    pub current_driver_name: Option<String>,
    pub odometer: Option<Decimal>,
    pub registration_expiry: Option<NaiveDate>,
    pub insurance_expiry: Option<NaiveDate>,
}

impl CsvRow for VehicleExportRow {
    const HEADERS: &'static [&'static str] = &[
        "registration",
        "vin",
        "make",
        "model",
        "year",
        "fuel_type",
        "ownership",
        "contractor_name",
        "status",
        "group_name",
        "current_driver_name",
        "odometer",
        "registration_expiry",
        "insurance_expiry",
    ];
}

/// Sortable vehicle columns
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VehicleSort {
    #[default]
    Registration,
    Make,
    Year,
    Status,
    Odometer,
    CreatedAt,
}

impl VehicleSort {
    fn column(&self) -> &'static str {
        match self {
            VehicleSort::Registration => "v.registration",
            VehicleSort::Make => "v.make",
            VehicleSort::Year => "v.year",
            VehicleSort::Status => "v.status",
            VehicleSort::Odometer => "v.odometer",
            VehicleSort::CreatedAt => "v.created_at",
        }
    }
}

/// Filters for listing vehicles
#[derive(Debug, Default, Deserialize)]
pub struct VehicleQuery {
    pub search: Option<String>,
    pub status: Option<VehicleStatus>,
    pub group_id: Option<Uuid>,
    pub ownership: Option<Ownership>,
    pub sort: Option<VehicleSort>,
    pub direction: Option<SortDirection>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Input for registering a vehicle
#[derive(Debug, Deserialize, Validate)]
pub struct CreateVehicleInput {
    pub registration: String,
    pub vin: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Make is required"))]
    pub make: String,
    #[validate(length(min = 1, max = 100, message = "Model is required"))]
    pub model: String,
    pub year: Option<i32>,
    pub colour: Option<String>,
    pub fuel_type: Option<FuelType>,
    #[serde(default)]
    pub ownership: Ownership,
    pub contractor_name: Option<String>,
    #[serde(default)]
    pub status: VehicleStatus,
    pub group_id: Option<Uuid>,
    pub odometer: Option<Decimal>,
    pub registration_expiry: Option<NaiveDate>,
    pub insurance_expiry: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Input for updating a vehicle
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateVehicleInput {
    pub registration: Option<String>,
    pub vin: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Make cannot be empty"))]
    pub make: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Model cannot be empty"))]
    pub model: Option<String>,
    pub year: Option<i32>,
    pub colour: Option<String>,
    pub fuel_type: Option<FuelType>,
    pub ownership: Option<Ownership>,
    pub contractor_name: Option<String>,
    pub status: Option<VehicleStatus>,
    /// Absent leaves the group alone, `null` removes the vehicle from its group
    #[serde(default, with = "double_option")]
    pub group_id: Option<Option<Uuid>>,
    pub odometer: Option<Decimal>,
    pub registration_expiry: Option<NaiveDate>,
    pub insurance_expiry: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Input for attaching or detaching a driver
#[derive(Debug, Deserialize)]
pub struct AssignDriverInput {
    pub driver_id: Option<Uuid>,
}

const VEHICLE_SELECT: &str = r#"
    SELECT v.id, v.registration, v.vin, v.make, v.model, v.year, v.colour, v.fuel_type,
           v.ownership, v.contractor_name, v.status, v.group_id, g.name AS group_name,
           v.current_driver_id,
           CASE WHEN d.id IS NULL THEN NULL ELSE d.first_name || ' ' || d.last_name END
               AS current_driver_name,
           v.odometer, v.registration_expiry, v.insurance_expiry, v.notes,
           v.created_at, v.updated_at
    FROM vehicles v
    LEFT JOIN vehicle_groups g ON g.id = v.group_id
    LEFT JOIN drivers d ON d.id = v.current_driver_id
"#;

const VEHICLE_FILTER: &str = r#"
    WHERE ($1::text IS NULL
           OR v.registration ILIKE $1 ESCAPE '\' OR v.make ILIKE $1 ESCAPE '\'
           OR v.model ILIKE $1 ESCAPE '\' OR v.vin ILIKE $1 ESCAPE '\')
      AND ($2::text IS NULL OR v.status = $2)
      AND ($3::uuid IS NULL OR v.group_id = $3)
      AND ($4::text IS NULL OR v.ownership = $4)
"#;

fn normalize_vin(vin: &str) -> AppResult<String> {
    let vin = vin.trim().to_uppercase();
    validate_vin(&vin).map_err(|msg| AppError::validation("vin", msg))?;
    Ok(vin)
}

fn check_registration(registration: &str) -> AppResult<String> {
    validate_registration(registration).map_err(|msg| AppError::validation("registration", msg))?;
    Ok(normalize_registration(registration))
}

/// `assigned` follows the driver, so a plain update can neither enter it nor
/// leave it while a driver is attached
fn check_status_change(
    current: VehicleStatus,
    requested: VehicleStatus,
    has_driver: bool,
) -> AppResult<()> {
    if requested == current {
        return Ok(());
    }
    if requested == VehicleStatus::Assigned {
        return Err(AppError::validation(
            "status",
            "Use driver assignment to mark a vehicle as assigned",
        ));
    }
    if has_driver {
        return Err(AppError::conflict(
            "vehicle",
            "Unassign the driver before changing the vehicle status",
        ));
    }
    Ok(())
}

fn check_contractor(ownership: Ownership, contractor_name: Option<&str>) -> AppResult<()> {
    let named = contractor_name.map(|n| !n.trim().is_empty()).unwrap_or(false);
    if ownership == Ownership::Contractor && !named {
        return Err(AppError::validation(
            "contractor_name",
            "Contractor vehicles need a contractor name",
        ));
    }
    Ok(())
}

impl VehicleService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List vehicles with search, filters, sorting and pagination
    pub async fn list_vehicles(&self, query: &VehicleQuery) -> AppResult<PaginatedResponse<Vehicle>> {
        let pagination = Pagination::from_query(query.page, query.per_page);
        let search = search_pattern(query.search.as_deref());
        let status = query.status.map(|s| s.as_str());
        let ownership = query.ownership.map(|o| o.as_str());

        let count_sql = format!("SELECT COUNT(*) FROM vehicles v {}", VEHICLE_FILTER);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(&search)
            .bind(status)
            .bind(query.group_id)
            .bind(ownership)
            .fetch_one(&self.db)
            .await?;

        let sort = query.sort.unwrap_or_default();
        let direction = query.direction.unwrap_or_default();
        let sql = format!(
            "{} {} ORDER BY {} {} NULLS LAST, v.id LIMIT $5 OFFSET $6",
            VEHICLE_SELECT,
            VEHICLE_FILTER,
            sort.column(),
            direction.as_sql()
        );

        let vehicles = sqlx::query_as::<_, Vehicle>(&sql)
            .bind(&search)
            .bind(status)
            .bind(query.group_id)
            .bind(ownership)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(vehicles, &pagination, total))
    }

    /// Get a vehicle by ID
    pub async fn get_vehicle(&self, vehicle_id: Uuid) -> AppResult<Vehicle> {
        let sql = format!("{} WHERE v.id = $1", VEHICLE_SELECT);
        sqlx::query_as::<_, Vehicle>(&sql)
            .bind(vehicle_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))
    }

    async fn ensure_unique(
        &self,
        registration: Option<&str>,
        vin: Option<&str>,
        except: Option<Uuid>,
    ) -> AppResult<()> {
        if let Some(registration) = registration {
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM vehicles WHERE registration = $1 AND ($2::uuid IS NULL OR id <> $2))",
            )
            .bind(registration)
            .bind(except)
            .fetch_one(&self.db)
            .await?;
            if taken {
                return Err(AppError::DuplicateEntry("registration".to_string()));
            }
        }
        if let Some(vin) = vin {
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM vehicles WHERE vin = $1 AND ($2::uuid IS NULL OR id <> $2))",
            )
            .bind(vin)
            .bind(except)
            .fetch_one(&self.db)
            .await?;
            if taken {
                return Err(AppError::DuplicateEntry("vin".to_string()));
            }
        }
        Ok(())
    }

    async fn ensure_group_exists(&self, group_id: Option<Uuid>) -> AppResult<()> {
        if let Some(group_id) = group_id {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM vehicle_groups WHERE id = $1)",
            )
            .bind(group_id)
            .fetch_one(&self.db)
            .await?;
            if !exists {
                return Err(AppError::validation("group_id", "Vehicle group does not exist"));
            }
        }
        Ok(())
    }

    /// Register a vehicle
    pub async fn create_vehicle(&self, actor: &Actor, input: CreateVehicleInput) -> AppResult<Vehicle> {
        input.validate()?;
        let registration = check_registration(&input.registration)?;
        let vin = input
            .vin
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(normalize_vin)
            .transpose()?;
        if let Some(year) = input.year {
            validate_vehicle_year(year, Utc::now().date_naive())
                .map_err(|msg| AppError::validation("year", msg))?;
        }
        if let Some(odometer) = input.odometer {
            validate_odometer(odometer, None).map_err(|msg| AppError::validation("odometer", msg))?;
        }
        if input.status == VehicleStatus::Assigned {
            return Err(AppError::validation(
                "status",
                "Use driver assignment to mark a vehicle as assigned",
            ));
        }
        check_contractor(input.ownership, input.contractor_name.as_deref())?;

        self.ensure_unique(Some(&registration), vin.as_deref(), None)
            .await?;
        self.ensure_group_exists(input.group_id).await?;

        let mut tx = self.db.begin().await?;

        let vehicle_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO vehicles (
                registration, vin, make, model, year, colour, fuel_type, ownership,
                contractor_name, status, group_id, odometer, registration_expiry,
                insurance_expiry, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(&registration)
        .bind(&vin)
        .bind(input.make.trim())
        .bind(input.model.trim())
        .bind(input.year)
        .bind(&input.colour)
        .bind(input.fuel_type.map(|f| f.as_str()))
        .bind(input.ownership.as_str())
        .bind(&input.contractor_name)
        .bind(input.status.as_str())
        .bind(input.group_id)
        .bind(input.odometer)
        .bind(input.registration_expiry)
        .bind(input.insurance_expiry)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "vehicle", vehicle_id)
                .with_details(json!({"registration": registration})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(vehicle_id = %vehicle_id, registration = %registration, "Vehicle created");
        self.get_vehicle(vehicle_id).await
    }

    /// Update a vehicle
    pub async fn update_vehicle(
        &self,
        actor: &Actor,
        vehicle_id: Uuid,
        input: UpdateVehicleInput,
    ) -> AppResult<Vehicle> {
        input.validate()?;
        let existing = self.get_vehicle(vehicle_id).await?;

        let registration = input
            .registration
            .as_deref()
            .map(check_registration)
            .transpose()?;
        let vin = input
            .vin
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(normalize_vin)
            .transpose()?;
        if let Some(year) = input.year {
            validate_vehicle_year(year, Utc::now().date_naive())
                .map_err(|msg| AppError::validation("year", msg))?;
        }
        if let Some(odometer) = input.odometer {
            validate_odometer(odometer, existing.odometer)
                .map_err(|msg| AppError::validation("odometer", msg))?;
        }

        if let Some(status) = input.status {
            let current: VehicleStatus = existing.status.parse().map_err(AppError::Internal)?;
            check_status_change(current, status, existing.current_driver_id.is_some())?;
        }

        let ownership = match input.ownership {
            Some(o) => o,
            None => existing.ownership.parse().unwrap_or_default(),
        };
        let contractor_name = input
            .contractor_name
            .as_deref()
            .or(existing.contractor_name.as_deref());
        check_contractor(ownership, contractor_name)?;

        self.ensure_unique(registration.as_deref(), vin.as_deref(), Some(vehicle_id))
            .await?;
        self.ensure_group_exists(input.group_id.flatten()).await?;

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE vehicles SET
                registration = COALESCE($2, registration),
                vin = COALESCE($3, vin),
                make = COALESCE($4, make),
                model = COALESCE($5, model),
                year = COALESCE($6, year),
                colour = COALESCE($7, colour),
                fuel_type = COALESCE($8, fuel_type),
                ownership = COALESCE($9, ownership),
                contractor_name = COALESCE($10, contractor_name),
                status = COALESCE($11, status),
                group_id = CASE WHEN $17 THEN $12 ELSE group_id END,
                odometer = COALESCE($13, odometer),
                registration_expiry = COALESCE($14, registration_expiry),
                insurance_expiry = COALESCE($15, insurance_expiry),
                notes = COALESCE($16, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(vehicle_id)
        .bind(&registration)
        .bind(&vin)
        .bind(input.make.as_deref().map(str::trim))
        .bind(input.model.as_deref().map(str::trim))
        .bind(input.year)
        .bind(&input.colour)
        .bind(input.fuel_type.map(|f| f.as_str()))
        .bind(input.ownership.map(|o| o.as_str()))
        .bind(&input.contractor_name)
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.group_id.flatten())
        .bind(input.odometer)
        .bind(input.registration_expiry)
        .bind(input.insurance_expiry)
        .bind(&input.notes)
        .bind(input.group_id.is_some())
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("update", "vehicle", vehicle_id).with_details(json!({
                "registration": registration,
                "status": input.status,
                "ownership": input.ownership,
                "group_id": input.group_id,
                "odometer": input.odometer,
            })),
        )
        .await?;

        tx.commit().await?;

        self.get_vehicle(vehicle_id).await
    }

    /// Delete a vehicle that has never been on an agreement. Returns the
    /// vehicle and the inspections and checks removed with it, so their
    /// attachments can be purged.
    pub async fn delete_vehicle(
        &self,
        actor: &Actor,
        vehicle_id: Uuid,
    ) -> AppResult<Vec<(EntityType, Uuid)>> {
        let vehicle = self.get_vehicle(vehicle_id).await?;

        let agreements = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM agreements WHERE vehicle_id = $1",
        )
        .bind(vehicle_id)
        .fetch_one(&self.db)
        .await?;
        if agreements > 0 {
            return Err(AppError::conflict(
                "vehicle",
                "Vehicle has agreements; retire it instead of deleting",
            ));
        }

        let mut tx = self.db.begin().await?;

        let inspections =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM inspections WHERE vehicle_id = $1")
                .bind(vehicle_id)
                .fetch_all(&mut *tx)
                .await?;
        let checks = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM contractor_vehicle_checks WHERE vehicle_id = $1",
        )
        .bind(vehicle_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM vehicles WHERE id = $1")
            .bind(vehicle_id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "vehicle", vehicle_id)
                .with_details(json!({"registration": vehicle.registration})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            vehicle_id = %vehicle_id,
            inspections = inspections.len(),
            checks = checks.len(),
            "Vehicle deleted"
        );

        let mut removed = vec![(EntityType::Vehicle, vehicle_id)];
        removed.extend(inspections.into_iter().map(|id| (EntityType::Inspection, id)));
        removed.extend(checks.into_iter().map(|id| (EntityType::ComplianceCheck, id)));
        Ok(removed)
    }

    /// Attach a driver to a vehicle, or detach with `driver_id: null`
    pub async fn assign_driver(
        &self,
        actor: &Actor,
        vehicle_id: Uuid,
        input: AssignDriverInput,
    ) -> AppResult<Vehicle> {
        let mut tx = self.db.begin().await?;
        set_driver(&mut tx, vehicle_id, input.driver_id).await?;
        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("assign_driver", "vehicle", vehicle_id)
                .with_details(json!({"driver_id": input.driver_id})),
        )
        .await?;
        tx.commit().await?;

        self.get_vehicle(vehicle_id).await
    }

    /// Vehicles matching the list filters, unpaginated, for CSV export
    pub async fn export_rows(&self, query: &VehicleQuery) -> AppResult<Vec<VehicleExportRow>> {
        let search = search_pattern(query.search.as_deref());

        let sql = format!(
            r#"
            SELECT v.registration, v.vin, v.make, v.model, v.year, v.fuel_type, v.ownership,
                   v.contractor_name, v.status, g.name AS group_name,
                   CASE WHEN d.id IS NULL THEN NULL ELSE d.first_name || ' ' || d.last_name END
                       AS current_driver_name,
                   v.odometer, v.registration_expiry, v.insurance_expiry
            FROM vehicles v
            LEFT JOIN vehicle_groups g ON g.id = v.group_id
            LEFT JOIN drivers d ON d.id = v.current_driver_id
            {}
            ORDER BY v.registration
            "#,
            VEHICLE_FILTER
        );

        let rows = sqlx::query_as::<_, VehicleExportRow>(&sql)
            .bind(&search)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.group_id)
            .bind(query.ownership.map(|o| o.as_str()))
            .fetch_all(&self.db)
            .await?;

        Ok(rows)
    }
}

/// Set or clear the driver on a vehicle inside a transaction, moving the
/// vehicle between `available` and `assigned`
pub(crate) async fn set_driver(
    conn: &mut PgConnection,
    vehicle_id: Uuid,
    driver_id: Option<Uuid>,
) -> AppResult<()> {
    let status = sqlx::query_scalar::<_, String>("SELECT status FROM vehicles WHERE id = $1 FOR UPDATE")
        .bind(vehicle_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))?;
    let status: VehicleStatus = status.parse().map_err(AppError::Internal)?;

    if let Some(driver_id) = driver_id {
        if !status.can_assign_driver() {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot assign a driver to a vehicle that is {}",
                status.as_str()
            )));
        }

        let driver_status = sqlx::query_scalar::<_, String>("SELECT status FROM drivers WHERE id = $1")
            .bind(driver_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::validation("driver_id", "Driver does not exist"))?;
        if driver_status != "active" {
            return Err(AppError::validation("driver_id", "Driver is not active"));
        }

        // A driver drives one vehicle at a time
        sqlx::query(
            r#"
            UPDATE vehicles
            SET current_driver_id = NULL,
                status = CASE WHEN status = 'assigned' THEN 'available' ELSE status END,
                updated_at = NOW()
            WHERE current_driver_id = $1 AND id <> $2
            "#,
        )
        .bind(driver_id)
        .bind(vehicle_id)
        .execute(&mut *conn)
        .await?;
    }

    let next = status.after_assignment(driver_id.is_some());

    sqlx::query(
        "UPDATE vehicles SET current_driver_id = $2, status = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(vehicle_id)
    .bind(driver_id)
    .bind(next.as_str())
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        vehicle_id = %vehicle_id,
        driver_id = ?driver_id,
        status = next.as_str(),
        "Vehicle driver updated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_columns_are_whitelisted() {
        assert_eq!(VehicleSort::default().column(), "v.registration");
        assert_eq!(VehicleSort::CreatedAt.column(), "v.created_at");
    }

    #[test]
    fn test_registration_is_normalised() {
        assert_eq!(check_registration("ab12 cde").unwrap(), "AB12CDE");
        assert!(check_registration("!").is_err());
    }

    #[test]
    fn test_vin_is_uppercased_and_checked() {
        assert_eq!(
            normalize_vin(" 1hgcm82633a004352 ").unwrap(),
            "1HGCM82633A004352"
        );
        assert!(normalize_vin("1HGCM82633A00435O").is_err());
    }

    #[test]
    fn test_contractor_vehicles_need_a_name() {
        assert!(check_contractor(Ownership::Contractor, None).is_err());
        assert!(check_contractor(Ownership::Contractor, Some("  ")).is_err());
        assert!(check_contractor(Ownership::Contractor, Some("Acme Hire")).is_ok());
        assert!(check_contractor(Ownership::Owned, None).is_ok());
    }

    #[test]
    fn test_status_cannot_leave_assigned_while_driver_attached() {
        use VehicleStatus::*;

        for target in [Available, Maintenance, OutOfService, Retired] {
            assert!(matches!(
                check_status_change(Assigned, target, true),
                Err(AppError::Conflict { .. })
            ));
        }
        assert!(check_status_change(Assigned, Assigned, true).is_ok());
        assert!(matches!(
            check_status_change(Available, Assigned, false),
            Err(AppError::Validation { ref field, .. }) if field == "status"
        ));
        assert!(check_status_change(Available, Maintenance, false).is_ok());
        assert!(check_status_change(Maintenance, Retired, false).is_ok());
    }

    #[test]
    fn test_update_distinguishes_null_group_from_absent() {
        let absent: UpdateVehicleInput = serde_json::from_str(r#"{"make":"Ford"}"#).unwrap();
        assert_eq!(absent.group_id, None);

        let cleared: UpdateVehicleInput = serde_json::from_str(r#"{"group_id":null}"#).unwrap();
        assert_eq!(cleared.group_id, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateVehicleInput =
            serde_json::from_value(json!({ "group_id": id })).unwrap();
        assert_eq!(set.group_id, Some(Some(id)));
    }

    #[test]
    fn test_export_headers_follow_field_order() {
        let row = VehicleExportRow {
            registration: "AB12CDE".into(),
            vin: None,
            make: "Toyota".into(),
            model: "Prius".into(),
            year: Some(2022),
            fuel_type: None,
            ownership: "owned".into(),
            contractor_name: None,
            status: "available".into(),
            group_name: None,
            current_driver_name: None,
            odometer: None,
            registration_expiry: None,
            insurance_expiry: None,
        };
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.serialize(&row).unwrap();
        let out = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        assert_eq!(out.lines().next(), Some(VehicleExportRow::HEADERS.join(",").as_str()));
    }
}
