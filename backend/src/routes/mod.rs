//! Route definitions for the Fleet Management Platform

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (login and refresh are public)
        .nest("/auth", auth_routes(&state))
        // Signing links (public - reached from the emailed link)
        .route(
            "/sign/:token",
            get(handlers::get_signing_view).post(handlers::sign_agreement),
        )
        // Protected routes - administration
        .nest("/users", user_routes(&state))
        .nest("/roles", role_routes(&state))
        .nest("/email-configs", email_config_routes(&state))
        .nest("/audit-logs", audit_log_routes(&state))
        // Protected routes - fleet
        .nest("/vehicle-groups", vehicle_group_routes(&state))
        .nest("/vehicles", vehicle_routes(&state))
        .nest("/drivers", driver_routes(&state))
        .nest("/inspections", inspection_routes(&state))
        // Protected routes - agreements
        .nest("/agreement-templates", agreement_template_routes(&state))
        .nest("/agreements", agreement_routes(&state))
        // Protected routes - compliance
        .nest("/compliance", compliance_routes(&state))
        // Protected routes - attachments
        .nest("/attachments", attachment_routes(&state))
        .nest("/dashboard", dashboard_routes(&state))
}

/// Session guard applied to every protected router
fn protected(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth_middleware,
    ))
}

/// Authentication routes
fn auth_routes(state: &AppState) -> Router<AppState> {
    let session = protected(
        Router::new()
            .route("/logout", post(handlers::logout))
            .route("/me", get(handlers::me))
            .route("/password", put(handlers::change_password)),
        state,
    );

    Router::new()
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .merge(session)
}

/// User administration routes (protected)
fn user_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route("/", get(handlers::list_users).post(handlers::create_user))
            .route(
                "/:user_id",
                get(handlers::get_user)
                    .put(handlers::update_user)
                    .delete(handlers::delete_user),
            )
            .route("/:user_id/password", put(handlers::reset_password)),
        state,
    )
}

/// Role management routes (protected)
fn role_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route("/", get(handlers::list_roles).post(handlers::create_role))
            .route("/permissions", get(handlers::list_permissions))
            .route(
                "/:role_id",
                get(handlers::get_role)
                    .put(handlers::update_role)
                    .delete(handlers::delete_role),
            ),
        state,
    )
}

/// SMTP configuration routes (protected)
fn email_config_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route(
                "/",
                get(handlers::list_email_configs).post(handlers::create_email_config),
            )
            .route("/test", post(handlers::send_test_email))
            .route(
                "/:config_id",
                get(handlers::get_email_config)
                    .put(handlers::update_email_config)
                    .delete(handlers::delete_email_config),
            )
            .route("/:config_id/activate", post(handlers::activate_email_config)),
        state,
    )
}

/// Audit trail routes (protected)
fn audit_log_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new().route("/", get(handlers::list_audit_logs)),
        state,
    )
}

/// Vehicle group routes (protected)
fn vehicle_group_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route("/", get(handlers::list_groups).post(handlers::create_group))
            .route(
                "/:group_id",
                get(handlers::get_group)
                    .put(handlers::update_group)
                    .delete(handlers::delete_group),
            ),
        state,
    )
}

/// Vehicle routes (protected)
fn vehicle_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route("/", get(handlers::list_vehicles).post(handlers::create_vehicle))
            .route("/export", get(handlers::export_vehicles_csv))
            .route(
                "/:vehicle_id",
                get(handlers::get_vehicle)
                    .put(handlers::update_vehicle)
                    .delete(handlers::delete_vehicle),
            )
            .route("/:vehicle_id/driver", put(handlers::assign_driver)),
        state,
    )
}

/// Driver routes (protected)
fn driver_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route("/", get(handlers::list_drivers).post(handlers::create_driver))
            .route("/export", get(handlers::export_drivers_csv))
            .route("/expiring-licences", get(handlers::expiring_licences))
            .route(
                "/:driver_id",
                get(handlers::get_driver)
                    .put(handlers::update_driver)
                    .delete(handlers::delete_driver),
            ),
        state,
    )
}

/// Inspection routes (protected)
fn inspection_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route(
                "/",
                get(handlers::list_inspections).post(handlers::create_inspection),
            )
            .route(
                "/:inspection_id",
                get(handlers::get_inspection)
                    .put(handlers::update_inspection)
                    .delete(handlers::delete_inspection),
            ),
        state,
    )
}

/// Agreement template routes (protected)
fn agreement_template_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route("/", get(handlers::list_templates).post(handlers::create_template))
            .route(
                "/:template_id",
                get(handlers::get_template)
                    .put(handlers::update_template)
                    .delete(handlers::delete_template),
            )
            .route("/:template_id/preview", post(handlers::preview_template)),
        state,
    )
}

/// Rental agreement routes (protected)
fn agreement_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route(
                "/",
                get(handlers::list_agreements).post(handlers::create_agreement),
            )
            .route(
                "/:agreement_id",
                get(handlers::get_agreement)
                    .put(handlers::update_agreement)
                    .delete(handlers::delete_agreement),
            )
            .route("/:agreement_id/send", post(handlers::send_for_signature))
            .route("/:agreement_id/terminate", post(handlers::terminate_agreement))
            .route("/:agreement_id/verify", get(handlers::verify_agreement)),
        state,
    )
}

/// Contractor compliance routes (protected)
fn compliance_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route(
                "/checks",
                get(handlers::list_checks).post(handlers::record_check),
            )
            .route(
                "/checks/:check_id",
                get(handlers::get_check).delete(handlers::delete_check),
            )
            .route("/weekly", get(handlers::weekly_status))
            .route("/vehicles/:vehicle_id/history", get(handlers::vehicle_history)),
        state,
    )
}

/// Attachment routes (protected)
fn attachment_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new()
            .route(
                "/:entity_type/:entity_id",
                get(handlers::list_attachments).post(handlers::upload_attachment),
            )
            .route(
                "/:entity_type/:entity_id/:attachment_id",
                get(handlers::get_attachment).delete(handlers::delete_attachment),
            ),
        state,
    )
}

/// Dashboard routes (protected)
fn dashboard_routes(state: &AppState) -> Router<AppState> {
    protected(
        Router::new().route("/", get(handlers::get_dashboard)),
        state,
    )
}
