//! Workflow tests against a real database
//!
//! These need a PostgreSQL database named by `TEST_DATABASE_URL`; run them
//! with `cargo test -- --ignored`. Object storage is a local stub.

mod common;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use common::{
    agreement_service, create_contractor_vehicle, create_driver, create_vehicle, link_token,
    migrated_pool, storage_stub, test_actor,
};
use fleet_backend::error::AppError;
use fleet_backend::services::agreement::{Agreement, SignInput, TerminateInput};
use fleet_backend::services::compliance::RecordCheckInput;
use fleet_backend::services::vehicle::{AssignDriverInput, UpdateVehicleInput};
use fleet_backend::services::{
    Actor, AgreementService, ComplianceService, DriverService, InspectionService, VehicleService,
};
use shared::{EntityType, VehicleStatus};

const SIGNATURE_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

fn signature(name: &str) -> SignInput {
    SignInput {
        signer_name: name.to_string(),
        signature_data: SIGNATURE_PNG.to_string(),
        accepted_terms: true,
    }
}

fn driver_ip() -> Actor {
    Actor::anonymous(Some("198.51.100.20".to_string()))
}

/// Draft agreement between a new driver and a new vehicle
async fn draft(pool: &PgPool, service: &AgreementService, actor: &Actor) -> Agreement {
    let vehicle = create_vehicle(pool, actor, json!({})).await;
    let driver = create_driver(pool, actor).await;
    let input = json!({
        "content": "Agreement {{agreement_number}} for {{driver_name}}",
        "driver_id": driver.id,
        "vehicle_id": vehicle.id,
        "start_date": Utc::now().date_naive(),
        "weekly_rate": "250.00",
        "deposit": "500.00",
    });
    service
        .create_agreement(actor, serde_json::from_value(input).expect("agreement input"))
        .await
        .expect("create agreement")
}

/// Draft and send; returns the agreement id and the signing token
async fn sent(pool: &PgPool, service: &AgreementService, actor: &Actor) -> (Uuid, String) {
    let agreement = draft(pool, service, actor).await;
    let link = service
        .send_for_signature(actor, agreement.id)
        .await
        .expect("send for signature");
    assert!(!link.email_sent);
    (agreement.id, link_token(&link.signing_link))
}

// ============================================================================
// Signing links
// ============================================================================

#[tokio::test]
#[ignore] // Requires database connection
async fn test_signing_twice_is_a_conflict() {
    let pool = migrated_pool().await;
    let storage = storage_stub().await;
    let service = agreement_service(&pool, &storage);
    let actor = test_actor(&pool).await;
    let (agreement_id, token) = sent(&pool, &service, &actor).await;

    let view = service
        .sign(&driver_ip(), Some("test-agent"), &token, signature("Sam Driver"))
        .await
        .expect("first signature");
    assert_eq!(view.status, "signed");
    assert_eq!(view.signer_name.as_deref(), Some("Sam Driver"));

    let again = service
        .sign(&driver_ip(), None, &token, signature("Sam Driver"))
        .await;
    assert!(matches!(again, Err(AppError::Conflict { .. })), "got {:?}", again);

    // The link keeps showing the signed agreement
    let view = service.get_signing_view(&token).await.expect("signed view");
    assert_eq!(view.status, "signed");

    let agreement = service.get_agreement(agreement_id).await.expect("agreement");
    assert_eq!(agreement.signer_ip.as_deref(), Some("198.51.100.20"));
    assert_eq!(agreement.signer_user_agent.as_deref(), Some("test-agent"));
    assert!(agreement.signature_seal.is_some());
    let verification = service.verify_seal(agreement_id).await.expect("verify");
    assert!(verification.content_matches && verification.seal_valid);

    let vehicle = VehicleService::new(pool.clone())
        .get_vehicle(agreement.vehicle_id)
        .await
        .expect("vehicle");
    assert_eq!(vehicle.current_driver_id, Some(agreement.driver_id));
    assert_eq!(vehicle.status, VehicleStatus::Assigned.as_str());
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_expired_link_is_gone() {
    let pool = migrated_pool().await;
    let storage = storage_stub().await;
    let service = agreement_service(&pool, &storage);
    let actor = test_actor(&pool).await;
    let (agreement_id, token) = sent(&pool, &service, &actor).await;

    sqlx::query(
        "UPDATE agreements SET signing_token_expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1",
    )
    .bind(agreement_id)
    .execute(&pool)
    .await
    .expect("expire link");

    assert!(matches!(
        service.get_signing_view(&token).await,
        Err(AppError::Gone(_))
    ));
    assert!(matches!(
        service.sign(&driver_ip(), None, &token, signature("Sam Driver")).await,
        Err(AppError::Gone(_))
    ));
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_terminated_link_is_gone() {
    let pool = migrated_pool().await;
    let storage = storage_stub().await;
    let service = agreement_service(&pool, &storage);
    let actor = test_actor(&pool).await;
    let (agreement_id, token) = sent(&pool, &service, &actor).await;

    let terminated = service
        .terminate(
            &actor,
            agreement_id,
            TerminateInput {
                reason: Some("Driver withdrew".to_string()),
            },
        )
        .await
        .expect("terminate");
    assert_eq!(terminated.status, "terminated");

    assert!(matches!(
        service.get_signing_view(&token).await,
        Err(AppError::Gone(_))
    ));
    assert!(matches!(
        service.sign(&driver_ip(), None, &token, signature("Sam Driver")).await,
        Err(AppError::Gone(_))
    ));
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_resending_replaces_the_link() {
    let pool = migrated_pool().await;
    let storage = storage_stub().await;
    let service = agreement_service(&pool, &storage);
    let actor = test_actor(&pool).await;
    let (agreement_id, old_token) = sent(&pool, &service, &actor).await;

    let link = service
        .send_for_signature(&actor, agreement_id)
        .await
        .expect("resend");
    let new_token = link_token(&link.signing_link);
    assert_ne!(new_token, old_token);

    assert!(matches!(
        service.get_signing_view(&old_token).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.sign(&driver_ip(), None, &old_token, signature("Sam Driver")).await,
        Err(AppError::NotFound(_))
    ));
    let view = service.get_signing_view(&new_token).await.expect("new link");
    assert_eq!(view.agreement_id, agreement_id);
}

// ============================================================================
// Compliance checks
// ============================================================================

#[tokio::test]
#[ignore] // Requires database connection
async fn test_second_check_in_a_week_is_a_conflict() {
    let pool = migrated_pool().await;
    let actor = test_actor(&pool).await;
    let vehicle = create_contractor_vehicle(&pool, &actor).await;
    let service = ComplianceService::new(pool.clone());

    let today = Utc::now().date_naive();
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let input = |date: NaiveDate| -> RecordCheckInput {
        serde_json::from_value(json!({
            "vehicle_id": vehicle.id,
            "check_date": date,
            "checklist": [{"item": "Tyres", "passed": true}, {"item": "Lights", "passed": true}],
        }))
        .expect("check input")
    };

    let check = service
        .record_check(&actor, input(monday))
        .await
        .expect("first check");
    assert_eq!(check.week_start, monday);
    assert!(check.passed);

    let again = service.record_check(&actor, input(today)).await;
    assert!(
        matches!(again, Err(AppError::Conflict { ref resource, .. }) if resource == "week_start"),
        "got {:?}",
        again
    );
}

// ============================================================================
// Inspections
// ============================================================================

#[tokio::test]
#[ignore] // Requires database connection
async fn test_odometer_cannot_go_backwards() {
    let pool = migrated_pool().await;
    let actor = test_actor(&pool).await;
    let vehicle = create_vehicle(&pool, &actor, json!({"odometer": "10000"})).await;

    let result = InspectionService::new(pool.clone())
        .create_inspection(
            &actor,
            serde_json::from_value(json!({
                "vehicle_id": vehicle.id,
                "odometer": "9000",
                "checklist": [{"item": "Brakes", "passed": true}],
            }))
            .expect("inspection input"),
        )
        .await;
    assert!(
        matches!(result, Err(AppError::Validation { ref field, .. }) if field == "odometer"),
        "got {:?}",
        result
    );

    let vehicle = VehicleService::new(pool.clone())
        .get_vehicle(vehicle.id)
        .await
        .expect("vehicle");
    assert_eq!(vehicle.odometer, Some(Decimal::from(10_000)));
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_failed_inspection_sends_vehicle_to_maintenance() {
    let pool = migrated_pool().await;
    let actor = test_actor(&pool).await;
    let vehicle = create_vehicle(&pool, &actor, json!({})).await;
    assert_eq!(vehicle.status, VehicleStatus::Available.as_str());

    let inspection = InspectionService::new(pool.clone())
        .create_inspection(
            &actor,
            serde_json::from_value(json!({
                "vehicle_id": vehicle.id,
                "odometer": "10500",
                "checklist": [
                    {"item": "Brakes", "passed": false, "notes": "Pads worn"},
                    {"item": "Lights", "passed": true},
                ],
            }))
            .expect("inspection input"),
        )
        .await
        .expect("inspection");
    assert_eq!(inspection.result, "fail");

    let vehicle = VehicleService::new(pool.clone())
        .get_vehicle(vehicle.id)
        .await
        .expect("vehicle");
    assert_eq!(vehicle.status, VehicleStatus::Maintenance.as_str());
    assert_eq!(vehicle.odometer, Some(Decimal::from(10_500)));
}

// ============================================================================
// Driver assignment
// ============================================================================

#[tokio::test]
#[ignore] // Requires database connection
async fn test_deactivating_driver_releases_vehicle() {
    let pool = migrated_pool().await;
    let actor = test_actor(&pool).await;
    let vehicles = VehicleService::new(pool.clone());
    let vehicle = create_vehicle(&pool, &actor, json!({})).await;
    let driver = create_driver(&pool, &actor).await;

    let assigned = vehicles
        .assign_driver(
            &actor,
            vehicle.id,
            AssignDriverInput {
                driver_id: Some(driver.id),
            },
        )
        .await
        .expect("assign");
    assert_eq!(assigned.status, VehicleStatus::Assigned.as_str());

    DriverService::new(pool.clone())
        .update_driver(
            &actor,
            driver.id,
            serde_json::from_value(json!({"status": "inactive"})).expect("driver update"),
        )
        .await
        .expect("deactivate");

    let vehicle = vehicles.get_vehicle(vehicle.id).await.expect("vehicle");
    assert_eq!(vehicle.current_driver_id, None);
    assert_eq!(vehicle.status, VehicleStatus::Available.as_str());
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_assigned_vehicle_keeps_status_while_driver_attached() {
    let pool = migrated_pool().await;
    let actor = test_actor(&pool).await;
    let vehicles = VehicleService::new(pool.clone());
    let vehicle = create_vehicle(&pool, &actor, json!({})).await;
    let driver = create_driver(&pool, &actor).await;

    vehicles
        .assign_driver(
            &actor,
            vehicle.id,
            AssignDriverInput {
                driver_id: Some(driver.id),
            },
        )
        .await
        .expect("assign");

    for status in [
        VehicleStatus::Available,
        VehicleStatus::Maintenance,
        VehicleStatus::OutOfService,
        VehicleStatus::Retired,
    ] {
        let result = vehicles
            .update_vehicle(
                &actor,
                vehicle.id,
                UpdateVehicleInput {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await;
        assert!(
            matches!(result, Err(AppError::Conflict { .. })),
            "{} while assigned: {:?}",
            status.as_str(),
            result
        );
    }

    let unchanged = vehicles.get_vehicle(vehicle.id).await.expect("vehicle");
    assert_eq!(unchanged.status, VehicleStatus::Assigned.as_str());
    assert_eq!(unchanged.current_driver_id, Some(driver.id));

    // Once the driver is detached the status is free to change
    vehicles
        .assign_driver(&actor, vehicle.id, AssignDriverInput { driver_id: None })
        .await
        .expect("unassign");
    let parked = vehicles
        .update_vehicle(
            &actor,
            vehicle.id,
            UpdateVehicleInput {
                status: Some(VehicleStatus::Maintenance),
                ..Default::default()
            },
        )
        .await
        .expect("maintenance");
    assert_eq!(parked.status, VehicleStatus::Maintenance.as_str());
}

// ============================================================================
// Vehicle updates and deletion
// ============================================================================

#[tokio::test]
#[ignore] // Requires database connection
async fn test_vehicle_group_can_be_cleared() {
    let pool = migrated_pool().await;
    let actor = test_actor(&pool).await;
    let group_id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO vehicle_groups (name) VALUES ($1) RETURNING id",
    )
    .bind(format!("Group {}", common::unique_tag()))
    .fetch_one(&pool)
    .await
    .expect("group");
    let vehicle = create_vehicle(&pool, &actor, json!({"group_id": group_id})).await;
    assert_eq!(vehicle.group_id, Some(group_id));

    let vehicles = VehicleService::new(pool.clone());
    let renamed = vehicles
        .update_vehicle(
            &actor,
            vehicle.id,
            serde_json::from_value(json!({"model": "Prius Plus"})).expect("update input"),
        )
        .await
        .expect("update");
    assert_eq!(renamed.group_id, Some(group_id));

    let cleared = vehicles
        .update_vehicle(
            &actor,
            vehicle.id,
            serde_json::from_value(json!({"group_id": null})).expect("update input"),
        )
        .await
        .expect("clear group");
    assert_eq!(cleared.group_id, None);
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_vehicle_delete_reports_cascaded_records() {
    let pool = migrated_pool().await;
    let actor = test_actor(&pool).await;
    let vehicle = create_contractor_vehicle(&pool, &actor).await;

    let inspection = InspectionService::new(pool.clone())
        .create_inspection(
            &actor,
            serde_json::from_value(json!({
                "vehicle_id": vehicle.id,
                "checklist": [{"item": "Tyres", "passed": true}],
            }))
            .expect("inspection input"),
        )
        .await
        .expect("inspection");
    let check = ComplianceService::new(pool.clone())
        .record_check(
            &actor,
            serde_json::from_value(json!({"vehicle_id": vehicle.id, "passed": true}))
                .expect("check input"),
        )
        .await
        .expect("check");

    let removed = VehicleService::new(pool.clone())
        .delete_vehicle(&actor, vehicle.id)
        .await
        .expect("delete");

    assert_eq!(removed[0], (EntityType::Vehicle, vehicle.id));
    assert!(removed.contains(&(EntityType::Inspection, inspection.id)));
    assert!(removed.contains(&(EntityType::ComplianceCheck, check.id)));
}
