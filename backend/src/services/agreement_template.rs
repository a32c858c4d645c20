//! Agreement template service and placeholder rendering

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::template::{self, TemplateError};

use crate::error::{AppError, AppResult};
use crate::services::audit::{self, Actor, AuditEvent};

/// Agreement template service
#[derive(Clone)]
pub struct AgreementTemplateService {
    db: PgPool,
}

/// Agreement template
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AgreementTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub body: String,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a template
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateInput {
    #[validate(length(min = 1, max = 200, message = "Template name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Template body is required"))]
    pub body: String,
    pub is_active: Option<bool>,
}

/// Input for updating a template
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTemplateInput {
    #[validate(length(min = 1, max = 200, message = "Template name cannot be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Template body cannot be empty"))]
    pub body: Option<String>,
    pub is_active: Option<bool>,
}

/// Agreement fields that feed the placeholders
#[derive(Debug, Clone, Deserialize)]
pub struct AgreementFields {
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub weekly_rate: Decimal,
    #[serde(default)]
    pub deposit: Decimal,
}

/// Rendered preview of a template
#[derive(Debug, Serialize)]
pub struct TemplatePreview {
    pub template_id: Uuid,
    pub content: String,
}

/// Map a template error to a 400 on the `body` field
pub(crate) fn template_error(err: TemplateError) -> AppError {
    AppError::validation("body", format!("Invalid template: {}", err))
}

/// Collect placeholder values for an agreement from its driver and vehicle
pub(crate) async fn placeholder_values(
    conn: &mut PgConnection,
    fields: &AgreementFields,
    agreement_number: &str,
) -> AppResult<HashMap<&'static str, String>> {
    let (first_name, last_name, email, licence_number) =
        sqlx::query_as::<_, (String, String, Option<String>, String)>(
            "SELECT first_name, last_name, email, licence_number FROM drivers WHERE id = $1",
        )
        .bind(fields.driver_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::validation("driver_id", "Driver does not exist"))?;

    let (registration, make, model) = sqlx::query_as::<_, (String, String, String)>(
        "SELECT registration, make, model FROM vehicles WHERE id = $1",
    )
    .bind(fields.vehicle_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::validation("vehicle_id", "Vehicle does not exist"))?;

    let mut values = HashMap::new();
    values.insert("agreement_number", agreement_number.to_string());
    values.insert("driver_name", format!("{} {}", first_name, last_name));
    values.insert("driver_email", email.unwrap_or_default());
    values.insert("driver_licence_number", licence_number);
    values.insert("vehicle_registration", registration);
    values.insert("vehicle_make", make);
    values.insert("vehicle_model", model);
    values.insert("start_date", fields.start_date.format("%d %B %Y").to_string());
    values.insert(
        "end_date",
        fields
            .end_date
            .map(|d| d.format("%d %B %Y").to_string())
            .unwrap_or_else(|| "open-ended".to_string()),
    );
    values.insert("weekly_rate", format!("{:.2}", fields.weekly_rate));
    values.insert("deposit", format!("{:.2}", fields.deposit));
    values.insert("today", Utc::now().date_naive().format("%d %B %Y").to_string());
    Ok(values)
}

impl AgreementTemplateService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_templates(&self, active_only: bool) -> AppResult<Vec<AgreementTemplate>> {
        let templates = sqlx::query_as::<_, AgreementTemplate>(
            r#"
            SELECT id, name, description, body, is_active, created_by, created_at, updated_at
            FROM agreement_templates
            WHERE ($1 = false OR is_active)
            ORDER BY name ASC
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(templates)
    }

    pub async fn get_template(&self, template_id: Uuid) -> AppResult<AgreementTemplate> {
        sqlx::query_as::<_, AgreementTemplate>(
            r#"
            SELECT id, name, description, body, is_active, created_by, created_at, updated_at
            FROM agreement_templates
            WHERE id = $1
            "#,
        )
        .bind(template_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Agreement template".to_string()))
    }

    async fn check_name_free(&self, name: &str, except: Option<Uuid>) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM agreement_templates
                WHERE LOWER(name) = LOWER($1) AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(name)
        .bind(except)
        .fetch_one(&self.db)
        .await?;
        if taken {
            return Err(AppError::DuplicateEntry("name".to_string()));
        }
        Ok(())
    }

    pub async fn create_template(
        &self,
        actor: &Actor,
        input: CreateTemplateInput,
    ) -> AppResult<AgreementTemplate> {
        input.validate()?;
        template::validate_template(&input.body).map_err(template_error)?;
        let name = input.name.trim();
        self.check_name_free(name, None).await?;

        let mut tx = self.db.begin().await?;

        let template_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO agreement_templates (name, description, body, is_active, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(&input.description)
        .bind(&input.body)
        .bind(input.is_active.unwrap_or(true))
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "agreement_template", template_id)
                .with_details(json!({"name": name})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(template_id = %template_id, "Agreement template created");
        self.get_template(template_id).await
    }

    /// Update a template. Existing agreements keep the content rendered when
    /// they were created.
    pub async fn update_template(
        &self,
        actor: &Actor,
        template_id: Uuid,
        input: UpdateTemplateInput,
    ) -> AppResult<AgreementTemplate> {
        input.validate()?;
        self.get_template(template_id).await?;

        if let Some(body) = &input.body {
            template::validate_template(body).map_err(template_error)?;
        }
        let name = input.name.as_deref().map(str::trim);
        if let Some(name) = name {
            self.check_name_free(name, Some(template_id)).await?;
        }

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE agreement_templates SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                body = COALESCE($4, body),
                is_active = COALESCE($5, is_active),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(template_id)
        .bind(name)
        .bind(&input.description)
        .bind(&input.body)
        .bind(input.is_active)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("update", "agreement_template", template_id).with_details(json!({
                "name": name,
                "body_changed": input.body.is_some(),
                "is_active": input.is_active,
            })),
        )
        .await?;

        tx.commit().await?;

        self.get_template(template_id).await
    }

    pub async fn delete_template(&self, actor: &Actor, template_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let name = sqlx::query_scalar::<_, String>(
            "DELETE FROM agreement_templates WHERE id = $1 RETURNING name",
        )
        .bind(template_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Agreement template".to_string()))?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "agreement_template", template_id)
                .with_details(json!({"name": name})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(template_id = %template_id, "Agreement template deleted");
        Ok(())
    }

    /// Render a template against real driver and vehicle data without
    /// creating anything
    pub async fn preview_template(
        &self,
        template_id: Uuid,
        fields: &AgreementFields,
    ) -> AppResult<TemplatePreview> {
        let tpl = self.get_template(template_id).await?;

        let mut conn = self.db.acquire().await?;
        let values = placeholder_values(&mut conn, fields, "AGR-PREVIEW").await?;
        let content = template::render(&tpl.body, &values).map_err(template_error)?;

        Ok(TemplatePreview {
            template_id,
            content,
        })
    }
}
