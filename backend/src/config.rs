//! Configuration management for the Fleet Management Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with FLEET__ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Session and token configuration
    pub session: SessionConfig,

    /// Object storage configuration
    pub storage: StorageConfig,

    /// Agreement signing configuration
    pub agreements: AgreementConfig,

    /// First-run administrator account
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,

    /// Externally reachable base URL, used in links sent to drivers
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Secret key for signing access tokens and agreement seals
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,

    /// Refresh token expiration in seconds
    pub refresh_token_expiry: i64,

    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Object storage API endpoint
    pub endpoint: String,

    /// Bucket holding attachments and signatures
    pub bucket: String,

    /// Service key for the storage API
    pub api_key: String,

    /// Upload size limit in bytes
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgreementConfig {
    /// How long a signing link stays valid
    pub signing_link_ttl_hours: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BootstrapConfig {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_name: Option<String>,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("FLEET_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.public_base_url", "http://localhost:3000")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("session.access_token_expiry", 3600)?
            .set_default("session.refresh_token_expiry", 604800)?
            .set_default("session.cookie_secure", environment == "production")?
            .set_default("storage.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("agreements.signing_link_ttl_hours", 168)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (FLEET__ prefix)
            .add_source(
                Environment::with_prefix("FLEET")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}
