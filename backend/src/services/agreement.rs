//! Rental agreement service and the e-signature workflow
//!
//! A driver signs through a link carrying a random token. Only the SHA-256
//! digest of the token is stored; sending again rotates it. Signing seals
//! the agreement with an HMAC over its id, content digest, signer and time.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::rust::double_option;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use shared::{
    format_agreement_number, signing_link_valid, template, transition, validate_amount,
    validate_date_range, AgreementAction, AgreementStatus, DriverStatus, PaginatedResponse,
    Pagination, VehicleStatus,
};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::external::{EmailService, StorageClient};
use crate::services::agreement_template::{placeholder_values, template_error, AgreementFields};
use crate::services::audit::{self, Actor, AuditEvent};
use crate::services::auth::{generate_opaque_token, hash_token};
use crate::services::email_config::active_smtp_settings;
use crate::services::vehicle::set_driver;

type HmacSha256 = Hmac<Sha256>;

/// Largest accepted signature image, before base64 encoding
const MAX_SIGNATURE_BYTES: usize = 512 * 1024;

/// Agreement service
#[derive(Clone)]
pub struct AgreementService {
    db: PgPool,
    storage: StorageClient,
    seal_secret: String,
    public_base_url: String,
    link_ttl: Duration,
}

/// Agreement with driver, vehicle and template names
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Agreement {
    pub id: Uuid,
    pub agreement_number: String,
    pub template_id: Option<Uuid>,
    pub template_name: Option<String>,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub driver_email: Option<String>,
    pub vehicle_id: Uuid,
    pub vehicle_registration: String,
    pub status: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub weekly_rate: Decimal,
    pub deposit: Decimal,
    pub content: String,
    pub signing_token_expires_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signer_name: Option<String>,
    pub signer_ip: Option<String>,
    pub signer_user_agent: Option<String>,
    pub signature_object_key: Option<String>,
    pub content_hash: Option<String>,
    pub signature_seal: Option<String>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agreement {
    fn status(&self) -> AppResult<AgreementStatus> {
        self.status.parse().map_err(AppError::Internal)
    }
}

/// Filters for listing agreements
#[derive(Debug, Default, Deserialize)]
pub struct AgreementQuery {
    pub status: Option<AgreementStatus>,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Input for drafting an agreement
#[derive(Debug, Deserialize)]
pub struct CreateAgreementInput {
    /// Template rendered into the content; required unless `content` is given
    pub template_id: Option<Uuid>,
    pub content: Option<String>,
    #[serde(flatten)]
    pub fields: AgreementFields,
}

/// Input for editing a draft
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAgreementInput {
    pub template_id: Option<Uuid>,
    pub content: Option<String>,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    /// Absent keeps the end date, `null` makes the agreement open-ended
    #[serde(default, with = "double_option")]
    pub end_date: Option<Option<NaiveDate>>,
    pub weekly_rate: Option<Decimal>,
    pub deposit: Option<Decimal>,
}

/// Result of sending an agreement for signature
#[derive(Debug, Serialize)]
pub struct SigningLink {
    pub agreement_id: Uuid,
    pub signing_link: String,
    pub expires_at: DateTime<Utc>,
    pub email_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_error: Option<String>,
}

/// Input for terminating an agreement
#[derive(Debug, Deserialize)]
pub struct TerminateInput {
    pub reason: Option<String>,
}

/// Driver's submission on the signing page
#[derive(Debug, Deserialize)]
pub struct SignInput {
    pub signer_name: String,
    /// PNG or JPEG, as a `data:` URL or bare base64
    pub signature_data: String,
    #[serde(default)]
    pub accepted_terms: bool,
}

/// What a driver sees behind a signing link
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SigningView {
    pub agreement_id: Uuid,
    pub agreement_number: String,
    pub status: String,
    pub driver_name: String,
    pub vehicle_registration: String,
    pub vehicle_description: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub weekly_rate: Decimal,
    pub deposit: Decimal,
    pub content: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signer_name: Option<String>,
}

/// Outcome of checking a signed agreement's seal
#[derive(Debug, Serialize)]
pub struct SealVerification {
    pub agreement_id: Uuid,
    pub signed: bool,
    pub content_matches: bool,
    pub seal_valid: bool,
}

const AGREEMENT_SELECT: &str = r#"
    SELECT a.id, a.agreement_number, a.template_id, t.name AS template_name,
           a.driver_id, d.first_name || ' ' || d.last_name AS driver_name,
           d.email AS driver_email, a.vehicle_id, v.registration AS vehicle_registration,
           a.status, a.start_date, a.end_date, a.weekly_rate, a.deposit, a.content,
           a.signing_token_expires_at, a.sent_at, a.signed_at, a.signer_name, a.signer_ip,
           a.signer_user_agent, a.signature_object_key, a.content_hash, a.signature_seal,
           a.terminated_at, a.termination_reason, a.created_by, a.created_at, a.updated_at
    FROM agreements a
    JOIN drivers d ON d.id = a.driver_id
    JOIN vehicles v ON v.id = a.vehicle_id
    LEFT JOIN agreement_templates t ON t.id = a.template_id
"#;

const SIGNING_VIEW_SELECT: &str = r#"
    SELECT a.id AS agreement_id, a.agreement_number, a.status,
           d.first_name || ' ' || d.last_name AS driver_name,
           v.registration AS vehicle_registration,
           v.make || ' ' || v.model AS vehicle_description,
           a.start_date, a.end_date, a.weekly_rate, a.deposit, a.content,
           a.signing_token_expires_at AS expires_at, a.signed_at, a.signer_name
    FROM agreements a
    JOIN drivers d ON d.id = a.driver_id
    JOIN vehicles v ON v.id = a.vehicle_id
    WHERE a.signing_token_hash = $1
"#;

/// Where an edited draft's body comes from
#[derive(Debug, PartialEq, Eq)]
enum DraftBody {
    /// Raw content supplied with the edit
    Content(String),
    Template(Uuid),
    /// No template left to render from: keep the stored content
    Unchanged,
}

/// Non-blank raw content wins over the template
fn draft_body(content: Option<&str>, template_id: Option<Uuid>) -> DraftBody {
    match (content, template_id) {
        (Some(content), _) if !content.trim().is_empty() => DraftBody::Content(content.to_string()),
        (_, Some(template_id)) => DraftBody::Template(template_id),
        _ => DraftBody::Unchanged,
    }
}

/// New random signing token, URL-safe
pub fn generate_signing_token() -> String {
    generate_opaque_token()
}

/// SHA-256 hex digest of agreement content
pub fn content_digest(content: &str) -> String {
    hash_token(content)
}

fn seal_message(id: Uuid, content_hash: &str, signer_name: &str, signed_at: DateTime<Utc>) -> String {
    format!(
        "{}|{}|{}|{}",
        id,
        content_hash,
        signer_name,
        signed_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

/// HMAC-SHA256 seal over the signed facts, hex encoded
pub fn compute_seal(
    secret: &str,
    id: Uuid,
    content_hash: &str,
    signer_name: &str,
    signed_at: DateTime<Utc>,
) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC key error: {}", e)))?;
    mac.update(seal_message(id, content_hash, signer_name, signed_at).as_bytes());
    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Decode a drawn signature into its content type and bytes
pub fn decode_signature(data: &str) -> AppResult<(&'static str, Vec<u8>)> {
    let data = data.trim();
    let (declared, encoded) = match data.strip_prefix("data:") {
        Some(rest) => {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| AppError::validation("signature_data", "Malformed data URL"))?;
            let mime = meta.strip_suffix(";base64").ok_or_else(|| {
                AppError::validation("signature_data", "Signature must be base64 encoded")
            })?;
            (Some(mime.to_lowercase()), payload)
        }
        None => (None, data),
    };

    if encoded.is_empty() {
        return Err(AppError::validation("signature_data", "Signature is required"));
    }
    if encoded.len() > MAX_SIGNATURE_BYTES * 4 / 3 + 4 {
        return Err(AppError::PayloadTooLarge(
            "Signature image is too large".to_string(),
        ));
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| AppError::validation("signature_data", "Signature is not valid base64"))?;

    // Trust the bytes, not the declared type
    let content_type = if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else {
        return Err(AppError::UnsupportedMediaType(
            "Signature must be a PNG or JPEG image".to_string(),
        ));
    };
    if let Some(declared) = declared {
        if declared != content_type {
            return Err(AppError::validation(
                "signature_data",
                "Signature type does not match its data",
            ));
        }
    }

    Ok((content_type, bytes))
}

fn validate_fields(fields: &AgreementFields) -> AppResult<()> {
    validate_date_range(fields.start_date, fields.end_date)
        .map_err(|msg| AppError::validation("end_date", msg))?;
    validate_amount(fields.weekly_rate).map_err(|msg| AppError::validation("weekly_rate", msg))?;
    validate_amount(fields.deposit).map_err(|msg| AppError::validation("deposit", msg))?;
    Ok(())
}

impl AgreementService {
    pub fn new(db: PgPool, config: &Config, storage: StorageClient) -> Self {
        Self {
            db,
            storage,
            seal_secret: config.session.secret.clone(),
            public_base_url: config.server.public_base_url.trim_end_matches('/').to_string(),
            link_ttl: Duration::hours(config.agreements.signing_link_ttl_hours),
        }
    }

    pub async fn list_agreements(
        &self,
        query: &AgreementQuery,
    ) -> AppResult<PaginatedResponse<Agreement>> {
        let pagination = Pagination::from_query(query.page, query.per_page);
        let status = query.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM agreements a
            WHERE ($1::text IS NULL OR a.status = $1)
              AND ($2::uuid IS NULL OR a.driver_id = $2)
              AND ($3::uuid IS NULL OR a.vehicle_id = $3)
            "#,
        )
        .bind(status)
        .bind(query.driver_id)
        .bind(query.vehicle_id)
        .fetch_one(&self.db)
        .await?;

        let sql = format!(
            r#"{}
            WHERE ($1::text IS NULL OR a.status = $1)
              AND ($2::uuid IS NULL OR a.driver_id = $2)
              AND ($3::uuid IS NULL OR a.vehicle_id = $3)
            ORDER BY a.created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            AGREEMENT_SELECT
        );
        let agreements = sqlx::query_as::<_, Agreement>(&sql)
            .bind(status)
            .bind(query.driver_id)
            .bind(query.vehicle_id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(agreements, &pagination, total))
    }

    pub async fn get_agreement(&self, agreement_id: Uuid) -> AppResult<Agreement> {
        let sql = format!("{} WHERE a.id = $1", AGREEMENT_SELECT);
        sqlx::query_as::<_, Agreement>(&sql)
            .bind(agreement_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Agreement".to_string()))
    }

    async fn check_parties(&self, driver_id: Uuid, vehicle_id: Uuid) -> AppResult<()> {
        let driver_status = sqlx::query_scalar::<_, String>("SELECT status FROM drivers WHERE id = $1")
            .bind(driver_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::validation("driver_id", "Driver does not exist"))?;
        if driver_status != DriverStatus::Active.as_str() {
            return Err(AppError::validation("driver_id", "Driver is not active"));
        }

        let vehicle_status = sqlx::query_scalar::<_, String>("SELECT status FROM vehicles WHERE id = $1")
            .bind(vehicle_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::validation("vehicle_id", "Vehicle does not exist"))?;
        if matches!(
            vehicle_status.parse::<VehicleStatus>(),
            Ok(VehicleStatus::Retired) | Ok(VehicleStatus::OutOfService)
        ) {
            return Err(AppError::validation(
                "vehicle_id",
                "Vehicle is not available for rental",
            ));
        }
        Ok(())
    }

    async fn template_body(&self, template_id: Uuid) -> AppResult<String> {
        let (body, is_active) = sqlx::query_as::<_, (String, bool)>(
            "SELECT body, is_active FROM agreement_templates WHERE id = $1",
        )
        .bind(template_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::validation("template_id", "Template does not exist"))?;
        if !is_active {
            return Err(AppError::validation("template_id", "Template is not active"));
        }
        Ok(body)
    }

    /// Draft a new agreement, rendering its content from a template
    pub async fn create_agreement(
        &self,
        actor: &Actor,
        input: CreateAgreementInput,
    ) -> AppResult<Agreement> {
        validate_fields(&input.fields)?;
        self.check_parties(input.fields.driver_id, input.fields.vehicle_id)
            .await?;

        let body = match (input.template_id, &input.content) {
            (Some(template_id), _) => self.template_body(template_id).await?,
            (None, Some(content)) if !content.trim().is_empty() => {
                template::validate_template(content).map_err(template_error)?;
                content.clone()
            }
            _ => {
                return Err(AppError::validation(
                    "template_id",
                    "A template or agreement content is required",
                ))
            }
        };

        let mut tx = self.db.begin().await?;

        let sequence = sqlx::query_scalar::<_, i64>("SELECT nextval('agreement_number_seq')")
            .fetch_one(&mut *tx)
            .await?;
        let agreement_number = format_agreement_number(Utc::now().year(), sequence);

        let values = placeholder_values(&mut tx, &input.fields, &agreement_number).await?;
        let content = template::render(&body, &values).map_err(template_error)?;

        let agreement_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO agreements (
                agreement_number, template_id, driver_id, vehicle_id, status, start_date,
                end_date, weekly_rate, deposit, content, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(&agreement_number)
        .bind(input.template_id)
        .bind(input.fields.driver_id)
        .bind(input.fields.vehicle_id)
        .bind(AgreementStatus::Draft.as_str())
        .bind(input.fields.start_date)
        .bind(input.fields.end_date)
        .bind(input.fields.weekly_rate)
        .bind(input.fields.deposit)
        .bind(&content)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "agreement", agreement_id).with_details(json!({
                "agreement_number": agreement_number,
                "driver_id": input.fields.driver_id,
                "vehicle_id": input.fields.vehicle_id,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            agreement_id = %agreement_id,
            agreement_number = %agreement_number,
            "Agreement drafted"
        );
        self.get_agreement(agreement_id).await
    }

    /// Edit a draft and re-render its content
    pub async fn update_agreement(
        &self,
        actor: &Actor,
        agreement_id: Uuid,
        input: UpdateAgreementInput,
    ) -> AppResult<Agreement> {
        let existing = self.get_agreement(agreement_id).await?;
        transition(existing.status()?, AgreementAction::Edit)?;

        let fields = AgreementFields {
            driver_id: input.driver_id.unwrap_or(existing.driver_id),
            vehicle_id: input.vehicle_id.unwrap_or(existing.vehicle_id),
            start_date: input.start_date.unwrap_or(existing.start_date),
            end_date: input.end_date.unwrap_or(existing.end_date),
            weekly_rate: input.weekly_rate.unwrap_or(existing.weekly_rate),
            deposit: input.deposit.unwrap_or(existing.deposit),
        };
        validate_fields(&fields)?;
        if input.driver_id.is_some() || input.vehicle_id.is_some() {
            self.check_parties(fields.driver_id, fields.vehicle_id).await?;
        }

        let source = draft_body(
            input.content.as_deref(),
            input.template_id.or(existing.template_id),
        );
        let template_id = match &source {
            DraftBody::Content(_) => input.template_id,
            DraftBody::Template(template_id) => Some(*template_id),
            DraftBody::Unchanged => None,
        };
        let body = match source {
            DraftBody::Content(content) => {
                template::validate_template(&content).map_err(template_error)?;
                Some(content)
            }
            DraftBody::Template(template_id) => Some(self.template_body(template_id).await?),
            DraftBody::Unchanged => None,
        };

        let mut tx = self.db.begin().await?;

        let content = match body {
            Some(body) => {
                let values =
                    placeholder_values(&mut tx, &fields, &existing.agreement_number).await?;
                template::render(&body, &values).map_err(template_error)?
            }
            None => existing.content.clone(),
        };

        let updated = sqlx::query(
            r#"
            UPDATE agreements SET
                template_id = $2, driver_id = $3, vehicle_id = $4, start_date = $5,
                end_date = $6, weekly_rate = $7, deposit = $8, content = $9,
                updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            "#,
        )
        .bind(agreement_id)
        .bind(template_id)
        .bind(fields.driver_id)
        .bind(fields.vehicle_id)
        .bind(fields.start_date)
        .bind(fields.end_date)
        .bind(fields.weekly_rate)
        .bind(fields.deposit)
        .bind(&content)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::InvalidStateTransition(
                "agreement is no longer a draft".to_string(),
            ));
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("update", "agreement", agreement_id).with_details(json!({
                "driver_id": fields.driver_id,
                "vehicle_id": fields.vehicle_id,
                "start_date": fields.start_date,
                "end_date": fields.end_date,
                "weekly_rate": fields.weekly_rate,
                "deposit": fields.deposit,
            })),
        )
        .await?;

        tx.commit().await?;

        self.get_agreement(agreement_id).await
    }

    /// Delete a draft
    pub async fn delete_agreement(&self, actor: &Actor, agreement_id: Uuid) -> AppResult<()> {
        let existing = self.get_agreement(agreement_id).await?;
        transition(existing.status()?, AgreementAction::Delete)?;

        let mut tx = self.db.begin().await?;

        let deleted = sqlx::query("DELETE FROM agreements WHERE id = $1 AND status = 'draft'")
            .bind(agreement_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::InvalidStateTransition(
                "agreement is no longer a draft".to_string(),
            ));
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "agreement", agreement_id)
                .with_details(json!({"agreement_number": existing.agreement_number})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(agreement_id = %agreement_id, "Draft agreement deleted");
        Ok(())
    }

    /// Issue a fresh signing link and email it to the driver when email is
    /// configured
    pub async fn send_for_signature(
        &self,
        actor: &Actor,
        agreement_id: Uuid,
    ) -> AppResult<SigningLink> {
        let existing = self.get_agreement(agreement_id).await?;
        let current = existing.status()?;
        let next = transition(current, AgreementAction::SendForSignature)?;

        let busy = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM agreements
                WHERE vehicle_id = $1 AND id <> $2 AND status IN ('pending_signature', 'signed')
            )
            "#,
        )
        .bind(existing.vehicle_id)
        .bind(agreement_id)
        .fetch_one(&self.db)
        .await?;
        if busy {
            return Err(AppError::conflict(
                "vehicle",
                "Vehicle is already on another active agreement",
            ));
        }

        let token = generate_signing_token();
        let expires_at = Utc::now() + self.link_ttl;

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE agreements SET
                status = $2,
                signing_token_hash = $3,
                signing_token_expires_at = $4,
                sent_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(agreement_id)
        .bind(next.as_str())
        .bind(hash_token(&token))
        .bind(expires_at)
        .bind(current.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::conflict(
                "agreement",
                "Agreement changed while sending; reload and try again",
            ));
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("send_for_signature", "agreement", agreement_id).with_details(json!({
                "expires_at": expires_at,
                "resent": current == AgreementStatus::PendingSignature,
            })),
        )
        .await?;

        tx.commit().await?;

        let signing_link = format!("{}/sign/{}", self.public_base_url, token);
        tracing::info!(
            agreement_id = %agreement_id,
            expires_at = %expires_at,
            "Agreement sent for signature"
        );

        let (email_sent, email_error) = match self.email_link(&existing, &signing_link).await {
            Ok(sent) => (sent, None),
            Err(e) => {
                tracing::warn!(agreement_id = %agreement_id, error = %e, "Signing link email failed");
                (false, Some(e.to_string()))
            }
        };

        Ok(SigningLink {
            agreement_id,
            signing_link,
            expires_at,
            email_sent,
            email_error,
        })
    }

    /// Email the link; `Ok(false)` when there is nothing to send with or to
    async fn email_link(&self, agreement: &Agreement, link: &str) -> AppResult<bool> {
        let Some(to) = agreement.driver_email.as_deref().filter(|e| !e.is_empty()) else {
            return Ok(false);
        };
        let Some(settings) = active_smtp_settings(&self.db).await? else {
            tracing::debug!("No active email configuration; signing link not emailed");
            return Ok(false);
        };

        EmailService::new(&settings)?
            .send_signing_link(to, &agreement.driver_name, &agreement.agreement_number, link)
            .await?;
        Ok(true)
    }

    /// Agreement behind a signing link
    pub async fn get_signing_view(&self, token: &str) -> AppResult<SigningView> {
        let view = sqlx::query_as::<_, SigningView>(SIGNING_VIEW_SELECT)
            .bind(hash_token(token))
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Signing link".to_string()))?;

        match view.status.parse::<AgreementStatus>() {
            Ok(AgreementStatus::Signed) => Ok(view),
            Ok(AgreementStatus::PendingSignature)
                if signing_link_valid(view.expires_at, Utc::now()) =>
            {
                Ok(view)
            }
            Ok(AgreementStatus::PendingSignature) => {
                Err(AppError::Gone("This signing link has expired".to_string()))
            }
            _ => Err(AppError::Gone(
                "This agreement is no longer available for signing".to_string(),
            )),
        }
    }

    /// Record a driver's signature
    pub async fn sign(
        &self,
        actor: &Actor,
        user_agent: Option<&str>,
        token: &str,
        input: SignInput,
    ) -> AppResult<SigningView> {
        if !input.accepted_terms {
            return Err(AppError::validation(
                "accepted_terms",
                "The terms must be accepted to sign",
            ));
        }
        let signer_name = input.signer_name.trim().to_string();
        if signer_name.is_empty() || signer_name.len() > 200 {
            return Err(AppError::validation("signer_name", "Please type your full name"));
        }

        let token_hash = hash_token(token);
        let (agreement_id, status, expires_at) =
            sqlx::query_as::<_, (Uuid, String, Option<DateTime<Utc>>)>(
                "SELECT id, status, signing_token_expires_at FROM agreements WHERE signing_token_hash = $1",
            )
            .bind(&token_hash)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Signing link".to_string()))?;

        let status: AgreementStatus = status.parse().map_err(AppError::Internal)?;
        match status {
            AgreementStatus::Terminated => {
                return Err(AppError::Gone(
                    "This agreement is no longer available for signing".to_string(),
                ))
            }
            AgreementStatus::PendingSignature if !signing_link_valid(expires_at, Utc::now()) => {
                return Err(AppError::Gone("This signing link has expired".to_string()))
            }
            _ => {}
        }
        transition(status, AgreementAction::Sign)?;

        let (content_type, image) = decode_signature(&input.signature_data)?;
        let extension = if content_type == "image/png" { "png" } else { "jpg" };
        let object_key = format!(
            "agreement/{}/signature-{}.{}",
            agreement_id,
            Uuid::new_v4(),
            extension
        );
        self.storage.upload(&object_key, content_type, image).await?;

        if let Err(e) = self
            .record_signature(actor, user_agent, agreement_id, &token_hash, &signer_name, &object_key)
            .await
        {
            if let Err(cleanup) = self.storage.delete(&object_key).await {
                tracing::warn!(key = %object_key, error = %cleanup, "Orphaned signature image");
            }
            return Err(e);
        }

        tracing::info!(agreement_id = %agreement_id, "Agreement signed");

        let sql = SIGNING_VIEW_SELECT.replace("a.signing_token_hash = $1", "a.id = $1");
        let view = sqlx::query_as::<_, SigningView>(&sql)
            .bind(agreement_id)
            .fetch_one(&self.db)
            .await?;
        Ok(view)
    }

    async fn record_signature(
        &self,
        actor: &Actor,
        user_agent: Option<&str>,
        agreement_id: Uuid,
        token_hash: &str,
        signer_name: &str,
        object_key: &str,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let (status, expires_at, content, driver_id, vehicle_id) = sqlx::query_as::<
            _,
            (String, Option<DateTime<Utc>>, String, Uuid, Uuid),
        >(
            r#"
            SELECT status, signing_token_expires_at, content, driver_id, vehicle_id
            FROM agreements
            WHERE id = $1 AND signing_token_hash = $2
            FOR UPDATE
            "#,
        )
        .bind(agreement_id)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Signing link".to_string()))?;

        // Re-check under the row lock; a concurrent signature wins
        let status: AgreementStatus = status.parse().map_err(AppError::Internal)?;
        transition(status, AgreementAction::Sign)?;
        let signed_at = Utc::now();
        if !signing_link_valid(expires_at, signed_at) {
            return Err(AppError::Gone("This signing link has expired".to_string()));
        }

        let content_hash = content_digest(&content);
        let seal = compute_seal(&self.seal_secret, agreement_id, &content_hash, signer_name, signed_at)?;

        // The token keeps resolving to the signed view but can no longer sign
        sqlx::query(
            r#"
            UPDATE agreements SET
                status = 'signed',
                signed_at = $2,
                signer_name = $3,
                signer_ip = $4,
                signer_user_agent = $5,
                signature_object_key = $6,
                content_hash = $7,
                signature_seal = $8,
                signing_token_expires_at = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(agreement_id)
        .bind(signed_at)
        .bind(signer_name)
        .bind(&actor.ip)
        .bind(user_agent)
        .bind(object_key)
        .bind(&content_hash)
        .bind(&seal)
        .execute(&mut *tx)
        .await?;

        // Hand the vehicle to the driver when it is free to take
        let vehicle_status = sqlx::query_scalar::<_, String>("SELECT status FROM vehicles WHERE id = $1")
            .bind(vehicle_id)
            .fetch_one(&mut *tx)
            .await?;
        match vehicle_status.parse::<VehicleStatus>() {
            Ok(s) if s.can_assign_driver() => set_driver(&mut tx, vehicle_id, Some(driver_id)).await?,
            _ => tracing::warn!(
                agreement_id = %agreement_id,
                vehicle_id = %vehicle_id,
                status = %vehicle_status,
                "Signed agreement's vehicle is not assignable; driver not attached"
            ),
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("sign", "agreement", agreement_id).with_details(json!({
                "signer_name": signer_name,
                "content_hash": content_hash,
                "user_agent": user_agent,
            })),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// End an agreement and release its vehicle
    pub async fn terminate(
        &self,
        actor: &Actor,
        agreement_id: Uuid,
        input: TerminateInput,
    ) -> AppResult<Agreement> {
        let existing = self.get_agreement(agreement_id).await?;
        let current = existing.status()?;
        let next = transition(current, AgreementAction::Terminate)?;

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE agreements SET
                status = $2,
                terminated_at = NOW(),
                termination_reason = $3,
                signing_token_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(agreement_id)
        .bind(next.as_str())
        .bind(input.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()))
        .bind(current.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::conflict(
                "agreement",
                "Agreement changed while terminating; reload and try again",
            ));
        }

        let current_driver = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT current_driver_id FROM vehicles WHERE id = $1",
        )
        .bind(existing.vehicle_id)
        .fetch_one(&mut *tx)
        .await?;
        let released = current_driver == Some(existing.driver_id);
        if released {
            set_driver(&mut tx, existing.vehicle_id, None).await?;
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("terminate", "agreement", agreement_id).with_details(json!({
                "previous_status": current,
                "reason": input.reason,
                "vehicle_released": released,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(agreement_id = %agreement_id, released, "Agreement terminated");
        self.get_agreement(agreement_id).await
    }

    /// Recompute a signed agreement's digest and seal
    pub async fn verify_seal(&self, agreement_id: Uuid) -> AppResult<SealVerification> {
        let agreement = self.get_agreement(agreement_id).await?;

        let (Some(signed_at), Some(signer_name), Some(stored_hash), Some(stored_seal)) = (
            agreement.signed_at,
            agreement.signer_name.as_deref(),
            agreement.content_hash.as_deref(),
            agreement.signature_seal.as_deref(),
        ) else {
            return Ok(SealVerification {
                agreement_id,
                signed: false,
                content_matches: false,
                seal_valid: false,
            });
        };

        let content_hash = content_digest(&agreement.content);
        let content_matches = content_hash == stored_hash;
        let expected = compute_seal(&self.seal_secret, agreement_id, &content_hash, signer_name, signed_at)?;

        Ok(SealVerification {
            agreement_id,
            signed: true,
            content_matches,
            seal_valid: content_matches && expected == stored_seal,
        })
    }
}
