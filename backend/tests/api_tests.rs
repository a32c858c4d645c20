//! HTTP surface tests
//!
//! Session handling, permission guards and input validation are all
//! decided before the database is consulted, so these run without one.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use common::{body_json, get, json, test_app, token_with};
use shared::{Action, Resource};

#[tokio::test]
async fn test_root_banner() {
    let (app, _) = test_app();

    let response = app.oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).starts_with("Fleet Management Platform API"));
}

#[tokio::test]
async fn test_health_reports_degraded_without_database() {
    let (app, _) = test_app();

    let response = app.oneshot(get("/api/v1/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let (app, _) = test_app();

    for uri in [
        "/api/v1/vehicles",
        "/api/v1/drivers",
        "/api/v1/agreements",
        "/api/v1/compliance/weekly",
        "/api/v1/audit-logs",
        "/api/v1/dashboard",
        "/api/v1/auth/me",
    ] {
        let response = app.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let (app, _) = test_app();

    let response = app
        .oneshot(get("/api/v1/vehicles", Some("not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_rejected() {
    let (app, _) = test_app();

    let mut other = common::test_state();
    let mut config = (*other.config).clone();
    config.session.secret = "some-other-secret".to_string();
    other.config = std::sync::Arc::new(config);
    let token = token_with(&other, &[(Resource::Vehicle, Action::View)]);

    let response = app
        .oneshot(get("/api/v1/vehicles", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let (app, state) = test_app();
    let token = token_with(&state, &[(Resource::Driver, Action::View)]);

    let cases = [
        get("/api/v1/vehicles", Some(&token)),
        get("/api/v1/agreements", Some(&token)),
        get("/api/v1/email-configs", Some(&token)),
        get("/api/v1/audit-logs", Some(&token)),
        get("/api/v1/vehicles/export", Some(&token)),
        json(
            "POST",
            "/api/v1/agreements/00000000-0000-0000-0000-000000000000/send",
            Some(&token),
            json!({}),
        ),
    ];
    for request in cases {
        let uri = request.uri().to_string();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");
    }
}

#[tokio::test]
async fn test_view_permission_does_not_grant_export() {
    let (app, state) = test_app();
    let token = token_with(&state, &[(Resource::Driver, Action::View)]);

    let response = app
        .oneshot(get("/api/v1/drivers/export", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let (app, state) = test_app();
    let token = token_with(&state, &[]);

    let request = Request::builder()
        .uri("/api/v1/vehicles")
        .header("cookie", format!("fleet_session={}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    // Authenticated, but without the permission
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_requires_email_and_password() {
    let (app, _) = test_app();

    let response = app
        .oneshot(json(
            "POST",
            "/api/v1/auth/login",
            None,
            json!({"email": "  ", "password": ""}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "email");
}

#[tokio::test]
async fn test_signing_requires_accepted_terms() {
    let (app, _) = test_app();

    let response = app
        .oneshot(json(
            "POST",
            "/api/v1/sign/some-token",
            None,
            json!({
                "signer_name": "Sam Driver",
                "signature_data": "data:image/png;base64,iVBORw0KGgo=",
                "accepted_terms": false
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["field"], "accepted_terms");
}

#[tokio::test]
async fn test_signing_requires_name() {
    let (app, _) = test_app();

    let response = app
        .oneshot(json(
            "POST",
            "/api/v1/sign/some-token",
            None,
            json!({
                "signer_name": "   ",
                "signature_data": "data:image/png;base64,iVBORw0KGgo=",
                "accepted_terms": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["field"], "signer_name");
}

#[tokio::test]
async fn test_vehicle_registration_validated() {
    let (app, state) = test_app();
    let token = token_with(&state, &[(Resource::Vehicle, Action::Create)]);

    let response = app
        .oneshot(json(
            "POST",
            "/api/v1/vehicles",
            Some(&token),
            json!({"registration": "!!", "make": "Toyota", "model": "Prius"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["field"], "registration");
}

#[tokio::test]
async fn test_vehicle_cannot_be_created_assigned() {
    let (app, state) = test_app();
    let token = token_with(&state, &[(Resource::Vehicle, Action::Create)]);

    let response = app
        .oneshot(json(
            "POST",
            "/api/v1/vehicles",
            Some(&token),
            json!({
                "registration": "AB12 CDE",
                "make": "Toyota",
                "model": "Prius",
                "status": "assigned"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["field"], "status");
}

#[tokio::test]
async fn test_compliance_check_cannot_be_future_dated() {
    let (app, state) = test_app();
    let token = token_with(&state, &[(Resource::Compliance, Action::Create)]);
    let tomorrow = chrono::Utc::now().date_naive() + chrono::Duration::days(1);

    let response = app
        .oneshot(json(
            "POST",
            "/api/v1/compliance/checks",
            Some(&token),
            json!({
                "vehicle_id": Uuid::new_v4(),
                "check_date": tomorrow,
                "passed": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["field"], "check_date");
}

#[tokio::test]
async fn test_unknown_attachment_owner_type() {
    let (app, state) = test_app();
    let token = token_with(&state, &[(Resource::Attachment, Action::View)]);

    let uri = format!("/api/v1/attachments/plot/{}", Uuid::new_v4());
    let response = app.oneshot(get(&uri, Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["field"], "entity_type");
}

#[tokio::test]
async fn test_email_config_validated() {
    let (app, state) = test_app();
    let token = token_with(&state, &[(Resource::EmailConfig, Action::Create)]);

    let response = app
        .oneshot(json(
            "POST",
            "/api/v1/email-configs",
            Some(&token),
            json!({
                "name": "Primary",
                "smtp_host": "smtp.example.com",
                "smtp_port": 587,
                "from_email": "not-an-email",
                "from_name": "Fleet Office"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
