//! Fleet Management Platform - Backend
//!
//! Vehicles, drivers, vehicle groups, inspections, rental agreements with
//! e-signature, contractor compliance checks, and user, role and email
//! administration behind a JSON API.

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

pub use config::Config;

use external::StorageClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub storage: StorageClient,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, config: Config) -> Self {
        let storage = StorageClient::new(&config.storage);
        Self {
            db,
            config: Arc::new(config),
            storage,
        }
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Multipart bodies carry the file plus form overhead
    let body_limit = state.config.storage.max_upload_bytes + 64 * 1024;

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .route("/sign/:token", get(handlers::render_signing_page))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Fleet Management Platform API v1.0"
}
