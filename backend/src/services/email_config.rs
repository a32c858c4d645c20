//! SMTP configuration stored in the database
//!
//! At most one row is active; the signing workflow sends through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::external::{EmailService, SmtpSettings};
use crate::services::audit::{self, Actor, AuditEvent};

/// Shown instead of a stored password
pub const PASSWORD_MASK: &str = "********";

/// Email configuration service
#[derive(Clone)]
pub struct EmailConfigService {
    db: PgPool,
}

/// Email configuration with the password masked
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EmailConfig {
    pub id: Uuid,
    pub name: String,
    pub smtp_host: String,
    pub smtp_port: i32,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an email configuration
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEmailConfigInput {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 255, message = "SMTP host is required"))]
    pub smtp_host: String,
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub smtp_port: i32,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[validate(email(message = "Invalid sender email address"))]
    pub from_email: String,
    #[validate(length(min = 1, max = 100, message = "Sender name is required"))]
    pub from_name: String,
    /// Make this the active configuration straight away
    #[serde(default)]
    pub activate: bool,
}

fn default_true() -> bool {
    true
}

/// Input for updating an email configuration.
/// An empty `smtp_password` clears the stored one; omitting it keeps it.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateEmailConfigInput {
    #[validate(length(min = 1, max = 100, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255, message = "SMTP host cannot be empty"))]
    pub smtp_host: Option<String>,
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub use_tls: Option<bool>,
    #[validate(email(message = "Invalid sender email address"))]
    pub from_email: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Sender name cannot be empty"))]
    pub from_name: Option<String>,
}

/// Input for sending a test message
#[derive(Debug, Deserialize, Validate)]
pub struct TestEmailInput {
    #[validate(email(message = "Invalid recipient email address"))]
    pub to: String,
    /// Configuration to test; defaults to the active one
    pub config_id: Option<Uuid>,
}

const CONFIG_SELECT: &str = r#"
    SELECT id, name, smtp_host, smtp_port, smtp_username,
           CASE WHEN smtp_password IS NULL THEN NULL ELSE '********' END AS smtp_password,
           use_tls, from_email, from_name, is_active, created_at, updated_at
    FROM email_configs
"#;

#[derive(sqlx::FromRow)]
struct SettingsRow {
    smtp_host: String,
    smtp_port: i32,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    use_tls: bool,
    from_email: String,
    from_name: String,
}

impl TryFrom<SettingsRow> for SmtpSettings {
    type Error = AppError;

    fn try_from(row: SettingsRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.smtp_port)
            .map_err(|_| AppError::Configuration(format!("invalid SMTP port {}", row.smtp_port)))?;
        Ok(SmtpSettings {
            host: row.smtp_host,
            port,
            username: row.smtp_username,
            password: row.smtp_password,
            use_tls: row.use_tls,
            from_email: row.from_email,
            from_name: row.from_name,
        })
    }
}

const SETTINGS_SELECT: &str = r#"
    SELECT smtp_host, smtp_port, smtp_username, smtp_password, use_tls, from_email, from_name
    FROM email_configs
"#;

/// Settings of the active configuration, if any
pub async fn active_smtp_settings(db: &PgPool) -> AppResult<Option<SmtpSettings>> {
    let sql = format!("{} WHERE is_active", SETTINGS_SELECT);
    sqlx::query_as::<_, SettingsRow>(&sql)
        .fetch_optional(db)
        .await?
        .map(SmtpSettings::try_from)
        .transpose()
}

/// Trim an optional text field, treating blank as absent
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl EmailConfigService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_configs(&self) -> AppResult<Vec<EmailConfig>> {
        let sql = format!("{} ORDER BY is_active DESC, name ASC", CONFIG_SELECT);
        let configs = sqlx::query_as::<_, EmailConfig>(&sql)
            .fetch_all(&self.db)
            .await?;
        Ok(configs)
    }

    pub async fn get_config(&self, config_id: Uuid) -> AppResult<EmailConfig> {
        let sql = format!("{} WHERE id = $1", CONFIG_SELECT);
        sqlx::query_as::<_, EmailConfig>(&sql)
            .bind(config_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Email configuration".to_string()))
    }

    pub async fn create_config(
        &self,
        actor: &Actor,
        input: CreateEmailConfigInput,
    ) -> AppResult<EmailConfig> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        if input.activate {
            sqlx::query("UPDATE email_configs SET is_active = false, updated_at = NOW() WHERE is_active")
                .execute(&mut *tx)
                .await?;
        }

        let config_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO email_configs (
                name, smtp_host, smtp_port, smtp_username, smtp_password, use_tls,
                from_email, from_name, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(input.name.trim())
        .bind(input.smtp_host.trim())
        .bind(input.smtp_port)
        .bind(non_blank(&input.smtp_username))
        .bind(input.smtp_password.as_deref().filter(|p| !p.is_empty()))
        .bind(input.use_tls)
        .bind(input.from_email.trim())
        .bind(input.from_name.trim())
        .bind(input.activate)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "email_config", config_id).with_details(json!({
                "name": input.name.trim(),
                "smtp_host": input.smtp_host.trim(),
                "active": input.activate,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(config_id = %config_id, "Email configuration created");
        self.get_config(config_id).await
    }

    pub async fn update_config(
        &self,
        actor: &Actor,
        config_id: Uuid,
        input: UpdateEmailConfigInput,
    ) -> AppResult<EmailConfig> {
        input.validate()?;

        // The masked value echoed back by a client means "unchanged"
        let password = input
            .smtp_password
            .as_deref()
            .filter(|p| *p != PASSWORD_MASK);

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE email_configs SET
                name = COALESCE($2, name),
                smtp_host = COALESCE($3, smtp_host),
                smtp_port = COALESCE($4, smtp_port),
                smtp_username = CASE WHEN $5::text IS NULL THEN smtp_username
                                     ELSE NULLIF($5, '') END,
                smtp_password = CASE WHEN $6::text IS NULL THEN smtp_password
                                     ELSE NULLIF($6, '') END,
                use_tls = COALESCE($7, use_tls),
                from_email = COALESCE($8, from_email),
                from_name = COALESCE($9, from_name),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(config_id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(input.smtp_host.as_deref().map(str::trim))
        .bind(input.smtp_port)
        .bind(input.smtp_username.as_deref().map(str::trim))
        .bind(password)
        .bind(input.use_tls)
        .bind(input.from_email.as_deref().map(str::trim))
        .bind(input.from_name.as_deref().map(str::trim))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Email configuration".to_string()));
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("update", "email_config", config_id).with_details(json!({
                "smtp_host": input.smtp_host,
                "smtp_port": input.smtp_port,
                "password_changed": password.is_some(),
            })),
        )
        .await?;

        tx.commit().await?;

        self.get_config(config_id).await
    }

    /// Make one configuration the active one, deactivating the rest
    pub async fn activate_config(&self, actor: &Actor, config_id: Uuid) -> AppResult<EmailConfig> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "UPDATE email_configs SET is_active = false, updated_at = NOW() WHERE is_active AND id <> $1",
        )
        .bind(config_id)
        .execute(&mut *tx)
        .await?;

        let activated = sqlx::query(
            "UPDATE email_configs SET is_active = true, updated_at = NOW() WHERE id = $1",
        )
        .bind(config_id)
        .execute(&mut *tx)
        .await?;

        if activated.rows_affected() == 0 {
            return Err(AppError::NotFound("Email configuration".to_string()));
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("activate", "email_config", config_id),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(config_id = %config_id, "Email configuration activated");
        self.get_config(config_id).await
    }

    pub async fn delete_config(&self, actor: &Actor, config_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let (name, was_active) = sqlx::query_as::<_, (String, bool)>(
            "DELETE FROM email_configs WHERE id = $1 RETURNING name, is_active",
        )
        .bind(config_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Email configuration".to_string()))?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "email_config", config_id)
                .with_details(json!({"name": name, "was_active": was_active})),
        )
        .await?;

        tx.commit().await?;

        if was_active {
            tracing::warn!(config_id = %config_id, "Active email configuration deleted; outbound email disabled");
        }
        Ok(())
    }

    /// Send a test message through a configuration
    pub async fn send_test_email(&self, actor: &Actor, input: TestEmailInput) -> AppResult<()> {
        input.validate()?;

        let settings = match input.config_id {
            Some(config_id) => {
                let sql = format!("{} WHERE id = $1", SETTINGS_SELECT);
                let row = sqlx::query_as::<_, SettingsRow>(&sql)
                    .bind(config_id)
                    .fetch_optional(&self.db)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Email configuration".to_string()))?;
                SmtpSettings::try_from(row)?
            }
            None => active_smtp_settings(&self.db).await?.ok_or_else(|| {
                AppError::validation("config_id", "No active email configuration")
            })?,
        };

        EmailService::new(&settings)?.send_test(input.to.trim()).await?;

        audit::record(
            &self.db,
            actor,
            AuditEvent {
                action: "send_test",
                entity_type: "email_config",
                entity_id: input.config_id,
                details: json!({"to": input.to.trim(), "host": settings.host}),
            },
        )
        .await?;

        tracing::info!(host = %settings.host, "Test email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_input() -> CreateEmailConfigInput {
        CreateEmailConfigInput {
            name: "Office relay".to_string(),
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            use_tls: true,
            from_email: "fleet@example.com".to_string(),
            from_name: "Fleet".to_string(),
            activate: false,
        }
    }

    #[test]
    fn test_create_input_validation() {
        assert!(create_input().validate().is_ok());

        let mut input = create_input();
        input.smtp_port = 0;
        assert!(input.validate().is_err());

        let mut input = create_input();
        input.smtp_port = 70000;
        assert!(input.validate().is_err());

        let mut input = create_input();
        input.from_email = "not-an-email".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_settings_reject_out_of_range_port() {
        let row = SettingsRow {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 70000,
            smtp_username: None,
            smtp_password: None,
            use_tls: true,
            from_email: "fleet@example.com".to_string(),
            from_name: "Fleet".to_string(),
        };
        assert!(matches!(
            SmtpSettings::try_from(row),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(&Some("  user ".to_string())), Some("user"));
        assert_eq!(non_blank(&Some("   ".to_string())), None);
        assert_eq!(non_blank(&None), None);
    }

    #[test]
    fn test_use_tls_defaults_on() {
        let input: CreateEmailConfigInput = serde_json::from_value(json!({
            "name": "Relay",
            "smtp_host": "smtp.example.com",
            "smtp_port": 25,
            "from_email": "fleet@example.com",
            "from_name": "Fleet"
        }))
        .unwrap();
        assert!(input.use_tls);
        assert!(!input.activate);
    }
}
