//! Fleet overview for the dashboard

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use shared::{
    compliance_percent, week_label, week_start, AgreementStatus, DriverStatus,
    VehicleStatus, LICENCE_EXPIRY_WARNING_DAYS,
};

use crate::error::AppResult;

/// Window for the recent inspections figures
const INSPECTION_WINDOW_DAYS: i64 = 30;

/// Dashboard service
#[derive(Clone)]
pub struct DashboardService {
    db: PgPool,
}

#[derive(Debug, Serialize)]
pub struct InspectionSummary {
    pub since: NaiveDate,
    pub total: i64,
    pub failed: i64,
}

#[derive(Debug, Serialize)]
pub struct ComplianceSummary {
    pub week_label: String,
    pub contractor_vehicles: i64,
    pub checked: i64,
    pub compliance_percent: Decimal,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub vehicles_by_status: BTreeMap<String, i64>,
    pub total_vehicles: i64,
    pub drivers_by_status: BTreeMap<String, i64>,
    pub total_drivers: i64,
    pub agreements_by_status: BTreeMap<String, i64>,
    pub inspections: InspectionSummary,
    pub compliance: ComplianceSummary,
    pub licences_expiring: i64,
    pub licences_expired: i64,
}

/// Counts for every known status, zero-filled
fn status_counts<'a>(
    known: impl IntoIterator<Item = &'a str>,
    rows: Vec<(String, i64)>,
) -> BTreeMap<String, i64> {
    let mut counts: BTreeMap<String, i64> = known.into_iter().map(|s| (s.to_string(), 0)).collect();
    for (status, count) in rows {
        *counts.entry(status).or_insert(0) += count;
    }
    counts
}

impl DashboardService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn grouped(&self, sql: &str) -> AppResult<Vec<(String, i64)>> {
        Ok(sqlx::query_as::<_, (String, i64)>(sql)
            .fetch_all(&self.db)
            .await?)
    }

    pub async fn summary(&self) -> AppResult<DashboardSummary> {
        let today = Utc::now().date_naive();

        let vehicles_by_status = status_counts(
            VehicleStatus::ALL.iter().map(|s| s.as_str()),
            self.grouped("SELECT status, COUNT(*) FROM vehicles GROUP BY status")
                .await?,
        );
        let drivers_by_status = status_counts(
            [DriverStatus::Active, DriverStatus::Inactive, DriverStatus::Suspended]
                .iter()
                .map(|s| s.as_str()),
            self.grouped("SELECT status, COUNT(*) FROM drivers GROUP BY status")
                .await?,
        );
        let agreements_by_status = status_counts(
            AgreementStatus::ALL.iter().map(|s| s.as_str()),
            self.grouped("SELECT status, COUNT(*) FROM agreements GROUP BY status")
                .await?,
        );

        let since = today - Duration::days(INSPECTION_WINDOW_DAYS);
        let (inspections_total, inspections_failed) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE result = 'fail')
            FROM inspections
            WHERE inspection_date >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        let week = week_start(today);
        let (contractor_vehicles, checked) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(c.id)
            FROM vehicles v
            LEFT JOIN contractor_vehicle_checks c
                   ON c.vehicle_id = v.id AND c.week_start = $1
            WHERE v.ownership = 'contractor' AND v.status <> 'retired'
            "#,
        )
        .bind(week)
        .fetch_one(&self.db)
        .await?;

        let (licences_expiring, licences_expired) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*) FILTER (WHERE licence_expiry >= $1 AND licence_expiry <= $2),
                   COUNT(*) FILTER (WHERE licence_expiry < $1)
            FROM drivers
            WHERE status = 'active'
            "#,
        )
        .bind(today)
        .bind(today + Duration::days(LICENCE_EXPIRY_WARNING_DAYS))
        .fetch_one(&self.db)
        .await?;

        Ok(DashboardSummary {
            total_vehicles: vehicles_by_status.values().sum(),
            vehicles_by_status,
            total_drivers: drivers_by_status.values().sum(),
            drivers_by_status,
            agreements_by_status,
            inspections: InspectionSummary {
                since,
                total: inspections_total,
                failed: inspections_failed,
            },
            compliance: ComplianceSummary {
                week_label: week_label(week),
                contractor_vehicles,
                checked,
                compliance_percent: compliance_percent(checked, contractor_vehicles),
            },
            licences_expiring,
            licences_expired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_counts_zero_fill() {
        let counts = status_counts(
            VehicleStatus::ALL.iter().map(|s| s.as_str()),
            vec![("available".to_string(), 3), ("retired".to_string(), 1)],
        );
        assert_eq!(counts.len(), VehicleStatus::ALL.len());
        assert_eq!(counts["available"], 3);
        assert_eq!(counts["assigned"], 0);
        assert_eq!(counts.values().sum::<i64>(), 4);
    }
}
