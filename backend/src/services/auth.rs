//! Authentication service for login, token management and passwords

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use shared::{validate_email, validate_password, SystemRole};

use crate::config::{BootstrapConfig, Config};
use crate::error::{AppError, AppResult};
use crate::services::audit::{self, Actor, AuditEvent};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub role_id: String,
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User info from database
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    role_id: Uuid,
    password_hash: String,
    is_active: bool,
}

/// Current user profile
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role_id: Uuid,
    pub role_name: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub permissions: Vec<String>,
}

/// Input for changing one's own password
#[derive(Debug, Deserialize)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

/// Decode and verify an access token
pub fn decode_access_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })
}

/// 32 random bytes, URL-safe base64 without padding
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a bearer secret for storage. Only the digest is persisted.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hash a password with bcrypt
pub fn hash_password(password: &str) -> AppResult<String> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.session.secret.clone(),
            access_token_expiry: config.session.access_token_expiry,
            refresh_token_expiry: config.session.refresh_token_expiry,
        }
    }

    /// Authenticate user with email and password
    pub async fn login(&self, email: &str, password: &str, actor: &Actor) -> AppResult<AuthTokens> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, role_id, password_hash, is_active
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        let valid = verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login refused: account disabled");
            return Err(AppError::Unauthorized("Account is disabled".to_string()));
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let permissions = self.get_user_permissions(user.id).await?;
        let tokens = self.generate_tokens(user.id, user.role_id, &permissions)?;
        self.store_refresh_token(user.id, &tokens.refresh_token)
            .await?;

        let actor = Actor::user(user.id, actor.ip.clone());
        audit::record(&self.db, &actor, AuditEvent::new("login", "user", user.id)).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair. The old refresh token
    /// is revoked.
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = hash_token(refresh_token);

        let mut tx = self.db.begin().await?;

        let (user_id, role_id) = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            UPDATE refresh_tokens rt
            SET revoked_at = NOW()
            FROM users u
            WHERE rt.token_hash = $1
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.id = rt.user_id
              AND u.is_active = true
            RETURNING u.id, u.role_id
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired refresh token".to_string()))?;

        let permissions = self.get_user_permissions(user_id).await?;
        let tokens = self.generate_tokens(user_id, role_id, &permissions)?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(hash_token(&tokens.refresh_token))
        .bind(Utc::now() + Duration::seconds(self.refresh_token_expiry))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(tokens)
    }

    /// Revoke every outstanding refresh token of a user
    pub async fn logout(&self, user_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        tracing::info!(
            user_id = %user_id,
            revoked = result.rows_affected(),
            "User logged out"
        );
        Ok(())
    }

    /// Profile of the authenticated user
    pub async fn me(&self, user_id: Uuid) -> AppResult<Profile> {
        let mut profile = sqlx::query_as::<_, Profile>(
            r#"
            SELECT u.id, u.email, u.name, u.role_id, r.name AS role_name,
                   u.is_active, u.last_login_at
            FROM users u
            JOIN roles r ON r.id = u.role_id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        profile.permissions = self.get_user_permissions(user_id).await?;
        Ok(profile)
    }

    /// Change the caller's own password after checking the current one
    pub async fn change_password(
        &self,
        actor: &Actor,
        user_id: Uuid,
        input: ChangePasswordInput,
    ) -> AppResult<()> {
        validate_password(&input.new_password)
            .map_err(|msg| AppError::validation("new_password", msg))?;

        let current_hash =
            sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let valid = verify(&input.current_password, &current_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            return Err(AppError::validation(
                "current_password",
                "Current password is incorrect",
            ));
        }

        let new_hash = hash_password(&input.new_password)?;

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(&new_hash)
            .execute(&mut *tx)
            .await?;

        // Other sessions must log in again
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("change_password", "user", user_id),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Create the first administrator when no users exist yet
    pub async fn ensure_bootstrap_admin(&self, bootstrap: &BootstrapConfig) -> AppResult<()> {
        let (Some(email), Some(password)) = (&bootstrap.admin_email, &bootstrap.admin_password)
        else {
            return Ok(());
        };

        let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        if users > 0 {
            return Ok(());
        }

        validate_email(email).map_err(|msg| AppError::Configuration(msg.to_string()))?;
        validate_password(password).map_err(|msg| AppError::Configuration(msg.to_string()))?;

        let role_id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM roles WHERE name = $1")
            .bind(SystemRole::Admin.as_str())
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::Configuration("admin role is missing".to_string()))?;

        let name = bootstrap
            .admin_name
            .clone()
            .unwrap_or_else(|| "Administrator".to_string());

        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (role_id, email, password_hash, name)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(role_id)
        .bind(email.trim().to_lowercase())
        .bind(hash_password(password)?)
        .bind(&name)
        .fetch_one(&self.db)
        .await?;

        audit::record(
            &self.db,
            &Actor::default(),
            AuditEvent::new("create", "user", user_id).with_details(json!({"bootstrap": true})),
        )
        .await?;

        tracing::info!(user_id = %user_id, email = %email, "Bootstrap administrator created");
        Ok(())
    }

    /// Get user permissions from database
    async fn get_user_permissions(&self, user_id: Uuid) -> AppResult<Vec<String>> {
        let permissions = sqlx::query_scalar::<_, String>(
            r#"
            SELECT CONCAT(p.resource, ':', p.action)
            FROM users u
            JOIN role_permissions rp ON rp.role_id = u.role_id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE u.id = $1
            ORDER BY p.resource, p.action
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(permissions)
    }

    /// Generate access and refresh tokens
    pub fn generate_tokens(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        permissions: &[String],
    ) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            sub: user_id.to_string(),
            role_id: role_id.to_string(),
            permissions: permissions.to_vec(),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        let refresh_token = generate_opaque_token();

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(hash_token(token))
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
