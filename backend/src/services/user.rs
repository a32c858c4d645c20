//! User administration service

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{search_pattern, validate_email, validate_password, PaginatedResponse, Pagination};

use crate::error::{AppError, AppResult};
use crate::services::audit::{self, Actor, AuditEvent};
use crate::services::auth::hash_password;

/// User service
#[derive(Clone)]
pub struct UserService {
    db: PgPool,
}

/// User account as shown to administrators
#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role_id: Uuid,
    pub role_name: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for listing users
#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub role_id: Option<Uuid>,
    pub active: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Input for creating a user
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    pub email: String,
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub password: String,
    pub role_id: Uuid,
}

/// Input for updating a user
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserInput {
    pub email: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

/// Input for an administrator resetting a password
#[derive(Debug, Deserialize)]
pub struct ResetPasswordInput {
    pub new_password: String,
}

const USER_SELECT: &str = r#"
    SELECT u.id, u.email, u.name, u.role_id, r.name AS role_name, u.is_active,
           u.last_login_at, u.created_at, u.updated_at
    FROM users u
    JOIN roles r ON r.id = u.role_id
"#;

impl UserService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List users with optional search and filters
    pub async fn list_users(&self, query: &UserQuery) -> AppResult<PaginatedResponse<UserAccount>> {
        let pagination = Pagination::from_query(query.page, query.per_page);
        let search = search_pattern(query.search.as_deref());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM users u
            WHERE ($1::text IS NULL OR u.name ILIKE $1 ESCAPE '\' OR u.email ILIKE $1 ESCAPE '\')
              AND ($2::uuid IS NULL OR u.role_id = $2)
              AND ($3::bool IS NULL OR u.is_active = $3)
            "#,
        )
        .bind(&search)
        .bind(query.role_id)
        .bind(query.active)
        .fetch_one(&self.db)
        .await?;

        let sql = format!(
            r#"{}
            WHERE ($1::text IS NULL OR u.name ILIKE $1 ESCAPE '\' OR u.email ILIKE $1 ESCAPE '\')
              AND ($2::uuid IS NULL OR u.role_id = $2)
              AND ($3::bool IS NULL OR u.is_active = $3)
            ORDER BY u.name ASC
            LIMIT $4 OFFSET $5
            "#,
            USER_SELECT
        );

        let users = sqlx::query_as::<_, UserAccount>(&sql)
            .bind(&search)
            .bind(query.role_id)
            .bind(query.active)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(users, &pagination, total))
    }

    /// Get a user by ID
    pub async fn get_user(&self, user_id: Uuid) -> AppResult<UserAccount> {
        let sql = format!("{} WHERE u.id = $1", USER_SELECT);
        sqlx::query_as::<_, UserAccount>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    async fn ensure_role_exists(&self, role_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM roles WHERE id = $1)")
            .bind(role_id)
            .fetch_one(&self.db)
            .await?;
        if !exists {
            return Err(AppError::validation("role_id", "Role does not exist"));
        }
        Ok(())
    }

    async fn ensure_email_free(&self, email: &str, except: Option<Uuid>) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE LOWER(email) = LOWER($1) AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.db)
        .await?;
        if taken {
            return Err(AppError::DuplicateEntry("email".to_string()));
        }
        Ok(())
    }

    /// Create a user account
    pub async fn create_user(&self, actor: &Actor, input: CreateUserInput) -> AppResult<UserAccount> {
        input.validate()?;
        let email = input.email.trim().to_lowercase();
        validate_email(&email).map_err(|msg| AppError::validation("email", msg))?;
        validate_password(&input.password).map_err(|msg| AppError::validation("password", msg))?;

        self.ensure_role_exists(input.role_id).await?;
        self.ensure_email_free(&email, None).await?;

        let password_hash = hash_password(&input.password)?;

        let mut tx = self.db.begin().await?;

        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (role_id, email, password_hash, name)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(input.role_id)
        .bind(&email)
        .bind(&password_hash)
        .bind(input.name.trim())
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "user", user_id)
                .with_details(json!({"email": email, "role_id": input.role_id})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "User created");
        self.get_user(user_id).await
    }

    /// Update a user account
    pub async fn update_user(
        &self,
        actor: &Actor,
        user_id: Uuid,
        input: UpdateUserInput,
    ) -> AppResult<UserAccount> {
        input.validate()?;
        let existing = self.get_user(user_id).await?;

        if actor.user_id == Some(user_id) && input.is_active == Some(false) {
            return Err(AppError::validation(
                "is_active",
                "You cannot deactivate your own account",
            ));
        }

        let email = match &input.email {
            Some(email) => {
                let email = email.trim().to_lowercase();
                validate_email(&email).map_err(|msg| AppError::validation("email", msg))?;
                self.ensure_email_free(&email, Some(user_id)).await?;
                Some(email)
            }
            None => None,
        };

        if let Some(role_id) = input.role_id {
            self.ensure_role_exists(role_id).await?;
        }

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                name = COALESCE($3, name),
                role_id = COALESCE($4, role_id),
                is_active = COALESCE($5, is_active),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&email)
        .bind(input.name.as_deref().map(str::trim))
        .bind(input.role_id)
        .bind(input.is_active)
        .execute(&mut *tx)
        .await?;

        // A deactivated account keeps no live sessions
        if input.is_active == Some(false) && existing.is_active {
            sqlx::query(
                "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("update", "user", user_id).with_details(json!({
                "email": email,
                "name": input.name,
                "role_id": input.role_id,
                "is_active": input.is_active,
            })),
        )
        .await?;

        tx.commit().await?;

        self.get_user(user_id).await
    }

    /// Set a new password for a user
    pub async fn reset_password(
        &self,
        actor: &Actor,
        user_id: Uuid,
        input: ResetPasswordInput,
    ) -> AppResult<()> {
        validate_password(&input.new_password)
            .map_err(|msg| AppError::validation("new_password", msg))?;
        self.get_user(user_id).await?;

        let password_hash = hash_password(&input.new_password)?;

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(&password_hash)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("reset_password", "user", user_id),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "Password reset by administrator");
        Ok(())
    }

    /// Delete a user account
    pub async fn delete_user(&self, actor: &Actor, user_id: Uuid) -> AppResult<()> {
        if actor.user_id == Some(user_id) {
            return Err(AppError::validation("id", "You cannot delete your own account"));
        }

        let mut tx = self.db.begin().await?;

        let email = sqlx::query_scalar::<_, String>("DELETE FROM users WHERE id = $1 RETURNING email")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "user", user_id).with_details(json!({"email": email})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "User deleted");
        Ok(())
    }
}
