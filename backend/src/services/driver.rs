//! Driver service

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{
    licence_state, search_pattern, validate_email, validate_licence_number, validate_phone,
    DriverStatus, LicenceState, PaginatedResponse, Pagination, LICENCE_EXPIRY_WARNING_DAYS,
};

use crate::error::{AppError, AppResult};
use crate::services::audit::{self, Actor, AuditEvent};
use crate::services::export::CsvRow;

/// Driver service
#[derive(Clone)]
pub struct DriverService {
    db: PgPool,
}

/// Driver record
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Driver {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub licence_number: String,
    pub licence_class: Option<String>,
    pub licence_expiry: Option<NaiveDate>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub current_vehicle_id: Option<Uuid>,
    pub current_vehicle_registration: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flat row for CSV export
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DriverExportRow {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub licence_number: String,
    pub licence_class: Option<String>,
    pub licence_expiry: Option<NaiveDate>,
    pub status: String,
    pub current_vehicle_registration: Option<String>,
}

impl CsvRow for DriverExportRow {
    const HEADERS: &'static [&'static str] = &[
        "first_name",
        "last_name",
        "email",
        "phone",
        "licence_number",
        "licence_class",
        "licence_expiry",
        "status",
        "current_vehicle_registration",
    ];
}

/// Driver whose licence has expired or expires soon
#[derive(Debug, Serialize)]
pub struct ExpiringLicence {
    pub driver_id: Uuid,
    pub name: String,
    pub licence_number: String,
    pub licence_expiry: NaiveDate,
    pub days_remaining: i64,
    pub state: LicenceState,
}

/// Filters for listing drivers
#[derive(Debug, Default, Deserialize)]
pub struct DriverQuery {
    pub search: Option<String>,
    pub status: Option<DriverStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Input for adding a driver
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDriverInput {
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub licence_number: String,
    pub licence_class: Option<String>,
    pub licence_expiry: Option<NaiveDate>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    #[serde(default)]
    pub status: DriverStatus,
    pub notes: Option<String>,
}

/// Input for updating a driver
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateDriverInput {
    #[validate(length(min = 1, max = 100, message = "First name cannot be empty"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Last name cannot be empty"))]
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub licence_number: Option<String>,
    pub licence_class: Option<String>,
    pub licence_expiry: Option<NaiveDate>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub status: Option<DriverStatus>,
    pub notes: Option<String>,
}

const DRIVER_SELECT: &str = r#"
    SELECT d.id, d.first_name, d.last_name, d.email, d.phone, d.licence_number,
           d.licence_class, d.licence_expiry, d.date_of_birth, d.address, d.status, d.notes,
           v.id AS current_vehicle_id, v.registration AS current_vehicle_registration,
           d.created_at, d.updated_at
    FROM drivers d
    LEFT JOIN vehicles v ON v.current_driver_id = d.id
"#;

const DRIVER_FILTER: &str = r#"
    WHERE ($1::text IS NULL
           OR d.first_name ILIKE $1 ESCAPE '\' OR d.last_name ILIKE $1 ESCAPE '\'
           OR (d.first_name || ' ' || d.last_name) ILIKE $1 ESCAPE '\'
           OR d.email ILIKE $1 ESCAPE '\' OR d.licence_number ILIKE $1 ESCAPE '\')
      AND ($2::text IS NULL OR d.status = $2)
"#;

fn normalize_licence(licence: &str) -> AppResult<String> {
    validate_licence_number(licence).map_err(|msg| AppError::validation("licence_number", msg))?;
    Ok(licence
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase())
}

fn check_contact(email: Option<&str>, phone: Option<&str>) -> AppResult<Option<String>> {
    if let Some(phone) = phone.filter(|p| !p.trim().is_empty()) {
        validate_phone(phone).map_err(|msg| AppError::validation("phone", msg))?;
    }
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => {
            validate_email(email).map_err(|msg| AppError::validation("email", msg))?;
            Ok(Some(email.to_lowercase()))
        }
        None => Ok(None),
    }
}

impl DriverService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_drivers(&self, query: &DriverQuery) -> AppResult<PaginatedResponse<Driver>> {
        let pagination = Pagination::from_query(query.page, query.per_page);
        let search = search_pattern(query.search.as_deref());
        let status = query.status.map(|s| s.as_str());

        let count_sql = format!("SELECT COUNT(*) FROM drivers d {}", DRIVER_FILTER);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(&search)
            .bind(status)
            .fetch_one(&self.db)
            .await?;

        let sql = format!(
            "{} {} ORDER BY d.last_name, d.first_name LIMIT $3 OFFSET $4",
            DRIVER_SELECT, DRIVER_FILTER
        );
        let drivers = sqlx::query_as::<_, Driver>(&sql)
            .bind(&search)
            .bind(status)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(drivers, &pagination, total))
    }

    pub async fn get_driver(&self, driver_id: Uuid) -> AppResult<Driver> {
        let sql = format!("{} WHERE d.id = $1", DRIVER_SELECT);
        sqlx::query_as::<_, Driver>(&sql)
            .bind(driver_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Driver".to_string()))
    }

    async fn ensure_licence_free(&self, licence: &str, except: Option<Uuid>) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM drivers
                WHERE UPPER(licence_number) = UPPER($1) AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(licence)
        .bind(except)
        .fetch_one(&self.db)
        .await?;
        if taken {
            return Err(AppError::DuplicateEntry("licence_number".to_string()));
        }
        Ok(())
    }

    pub async fn create_driver(&self, actor: &Actor, input: CreateDriverInput) -> AppResult<Driver> {
        input.validate()?;
        let licence = normalize_licence(&input.licence_number)?;
        let email = check_contact(input.email.as_deref(), input.phone.as_deref())?;
        self.ensure_licence_free(&licence, None).await?;

        let mut tx = self.db.begin().await?;

        let driver_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO drivers (
                first_name, last_name, email, phone, licence_number, licence_class,
                licence_expiry, date_of_birth, address, status, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(&email)
        .bind(&input.phone)
        .bind(&licence)
        .bind(&input.licence_class)
        .bind(input.licence_expiry)
        .bind(input.date_of_birth)
        .bind(&input.address)
        .bind(input.status.as_str())
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "driver", driver_id).with_details(json!({
                "name": format!("{} {}", input.first_name.trim(), input.last_name.trim()),
                "licence_number": licence,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(driver_id = %driver_id, "Driver created");
        self.get_driver(driver_id).await
    }

    pub async fn update_driver(
        &self,
        actor: &Actor,
        driver_id: Uuid,
        input: UpdateDriverInput,
    ) -> AppResult<Driver> {
        input.validate()?;
        let existing = self.get_driver(driver_id).await?;

        let licence = input
            .licence_number
            .as_deref()
            .map(normalize_licence)
            .transpose()?;
        if let Some(licence) = &licence {
            self.ensure_licence_free(licence, Some(driver_id)).await?;
        }
        let email = check_contact(input.email.as_deref(), input.phone.as_deref())?;

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE drivers SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                licence_number = COALESCE($6, licence_number),
                licence_class = COALESCE($7, licence_class),
                licence_expiry = COALESCE($8, licence_expiry),
                date_of_birth = COALESCE($9, date_of_birth),
                address = COALESCE($10, address),
                status = COALESCE($11, status),
                notes = COALESCE($12, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(driver_id)
        .bind(input.first_name.as_deref().map(str::trim))
        .bind(input.last_name.as_deref().map(str::trim))
        .bind(&email)
        .bind(&input.phone)
        .bind(&licence)
        .bind(&input.licence_class)
        .bind(input.licence_expiry)
        .bind(input.date_of_birth)
        .bind(&input.address)
        .bind(input.status.map(|s| s.as_str()))
        .bind(&input.notes)
        .execute(&mut *tx)
        .await?;

        // A driver who is no longer active hands back their vehicle
        let deactivated = matches!(
            input.status,
            Some(DriverStatus::Inactive) | Some(DriverStatus::Suspended)
        );
        if deactivated {
            if let Some(vehicle_id) = existing.current_vehicle_id {
                crate::services::vehicle::set_driver(&mut tx, vehicle_id, None).await?;
            }
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("update", "driver", driver_id).with_details(json!({
                "status": input.status,
                "licence_number": licence,
                "licence_expiry": input.licence_expiry,
            })),
        )
        .await?;

        tx.commit().await?;

        self.get_driver(driver_id).await
    }

    /// Delete a driver without pending or signed agreements
    pub async fn delete_driver(&self, actor: &Actor, driver_id: Uuid) -> AppResult<()> {
        let driver = self.get_driver(driver_id).await?;

        let active = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM agreements WHERE driver_id = $1 AND status IN ('pending_signature', 'signed')",
        )
        .bind(driver_id)
        .fetch_one(&self.db)
        .await?;
        if active > 0 {
            return Err(AppError::conflict(
                "driver",
                "Driver has an active agreement; terminate it first",
            ));
        }

        let any = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM agreements WHERE driver_id = $1")
            .bind(driver_id)
            .fetch_one(&self.db)
            .await?;
        if any > 0 {
            return Err(AppError::conflict(
                "driver",
                "Driver has agreement history; mark them inactive instead",
            ));
        }

        let mut tx = self.db.begin().await?;

        if let Some(vehicle_id) = driver.current_vehicle_id {
            crate::services::vehicle::set_driver(&mut tx, vehicle_id, None).await?;
        }

        sqlx::query("DELETE FROM drivers WHERE id = $1")
            .bind(driver_id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "driver", driver_id).with_details(json!({
                "name": format!("{} {}", driver.first_name, driver.last_name),
                "licence_number": driver.licence_number,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(driver_id = %driver_id, "Driver deleted");
        Ok(())
    }

    /// Drivers whose licence expires within `within_days`, including
    /// already expired ones, soonest first
    pub async fn expiring_licences(&self, within_days: Option<i64>) -> AppResult<Vec<ExpiringLicence>> {
        let within_days = within_days
            .unwrap_or(LICENCE_EXPIRY_WARNING_DAYS)
            .clamp(0, 365);
        let today = Utc::now().date_naive();
        let horizon = today + Duration::days(within_days);

        let rows = sqlx::query_as::<_, (Uuid, String, String, String, NaiveDate)>(
            r#"
            SELECT id, first_name, last_name, licence_number, licence_expiry
            FROM drivers
            WHERE licence_expiry IS NOT NULL
              AND licence_expiry <= $1
              AND status <> 'inactive'
            ORDER BY licence_expiry ASC
            "#,
        )
        .bind(horizon)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, first, last, licence_number, expiry)| ExpiringLicence {
                driver_id: id,
                name: format!("{} {}", first, last),
                licence_number,
                licence_expiry: expiry,
                days_remaining: (expiry - today).num_days(),
                state: licence_state(expiry, today),
            })
            .collect())
    }

    /// Drivers matching the list filters, unpaginated, for CSV export
    pub async fn export_rows(&self, query: &DriverQuery) -> AppResult<Vec<DriverExportRow>> {
        let sql = format!(
            r#"
            SELECT d.first_name, d.last_name, d.email, d.phone, d.licence_number,
                   d.licence_class, d.licence_expiry, d.status,
                   v.registration AS current_vehicle_registration
            FROM drivers d
            LEFT JOIN vehicles v ON v.current_driver_id = d.id
            {}
            ORDER BY d.last_name, d.first_name
            "#,
            DRIVER_FILTER
        );

        let rows = sqlx::query_as::<_, DriverExportRow>(&sql)
            .bind(search_pattern(query.search.as_deref()))
            .bind(query.status.map(|s| s.as_str()))
            .fetch_all(&self.db)
            .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_licence_is_normalised() {
        assert_eq!(normalize_licence("smith 123-45").unwrap(), "SMITH12345");
        assert!(normalize_licence("ab1").is_err());
    }

    #[test]
    fn test_contact_checks() {
        assert_eq!(
            check_contact(Some(" Jo@Example.com "), Some("+44 7700 900123")).unwrap(),
            Some("jo@example.com".to_string())
        );
        assert_eq!(check_contact(Some("  "), None).unwrap(), None);
        assert!(check_contact(Some("nope"), None).is_err());
        assert!(check_contact(None, Some("12")).is_err());
    }

    #[test]
    fn test_export_headers_follow_field_order() {
        let row = DriverExportRow {
            first_name: "Sam".into(),
            last_name: "Driver".into(),
            email: None,
            phone: None,
            licence_number: "SMITH12345".into(),
            licence_class: None,
            licence_expiry: None,
            status: "active".into(),
            current_vehicle_registration: None,
        };
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.serialize(&row).unwrap();
        let out = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        assert_eq!(out.lines().next(), Some(DriverExportRow::HEADERS.join(",").as_str()));
    }
}
