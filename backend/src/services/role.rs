//! Role management service for custom roles and permissions

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use shared::SystemRole;

use crate::error::{AppError, AppResult};
use crate::services::audit::{self, Actor, AuditEvent};

/// Role service for managing custom roles
#[derive(Clone)]
pub struct RoleService {
    db: PgPool,
}

/// Role information
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub user_count: i64,
}

/// Permission information
#[derive(Debug, Serialize, Clone, sqlx::FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
}

/// Input for creating a custom role
#[derive(Debug, Deserialize)]
pub struct CreateRoleInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

/// Input for updating a role
#[derive(Debug, Deserialize)]
pub struct UpdateRoleInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permission_ids: Option<Vec<Uuid>>,
}

/// Role with its permissions
#[derive(Debug, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

const ROLE_SELECT: &str = r#"
    SELECT r.id, r.name, r.description, r.is_system_role,
           (SELECT COUNT(*) FROM users u WHERE u.role_id = r.id) AS user_count
    FROM roles r
"#;

/// Validate a custom role name
fn check_role_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(AppError::validation(
            "name",
            "Role name must be between 1 and 100 characters",
        ));
    }
    if SystemRole::is_reserved_name(name) {
        return Err(AppError::validation("name", "Cannot use reserved role name"));
    }
    Ok(name.to_string())
}

impl RoleService {
    /// Create a new RoleService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get all roles
    pub async fn get_roles(&self) -> AppResult<Vec<Role>> {
        let sql = format!("{} ORDER BY r.is_system_role DESC, r.name ASC", ROLE_SELECT);
        let roles = sqlx::query_as::<_, Role>(&sql).fetch_all(&self.db).await?;

        Ok(roles)
    }

    async fn get_role(&self, role_id: Uuid) -> AppResult<Role> {
        let sql = format!("{} WHERE r.id = $1", ROLE_SELECT);
        sqlx::query_as::<_, Role>(&sql)
            .bind(role_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Role".to_string()))
    }

    /// Get a role by ID with its permissions
    pub async fn get_role_with_permissions(&self, role_id: Uuid) -> AppResult<RoleWithPermissions> {
        let role = self.get_role(role_id).await?;

        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.resource, p.action, p.description
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.resource, p.action
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;

        Ok(RoleWithPermissions { role, permissions })
    }

    /// Get all available permissions
    pub async fn get_all_permissions(&self) -> AppResult<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, resource, action, description
            FROM permissions
            ORDER BY resource, action
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(permissions)
    }

    async fn check_name_free(&self, name: &str, except: Option<Uuid>) -> AppResult<()> {
        let duplicate = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM roles WHERE LOWER(name) = LOWER($1) AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(name)
        .bind(except)
        .fetch_one(&self.db)
        .await?;

        if duplicate > 0 {
            return Err(AppError::conflict(
                "role",
                "Role with this name already exists",
            ));
        }
        Ok(())
    }

    async fn check_permission_ids(&self, permission_ids: &[Uuid]) -> AppResult<()> {
        if permission_ids.is_empty() {
            return Ok(());
        }
        let valid_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT id) FROM permissions WHERE id = ANY($1)",
        )
        .bind(permission_ids)
        .fetch_one(&self.db)
        .await?;

        let mut distinct = permission_ids.to_vec();
        distinct.sort();
        distinct.dedup();

        if valid_count != distinct.len() as i64 {
            return Err(AppError::validation(
                "permission_ids",
                "One or more permission IDs are invalid",
            ));
        }
        Ok(())
    }

    async fn replace_permissions(
        conn: &mut PgConnection,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            SELECT $1, id FROM permissions WHERE id = ANY($2)
            "#,
        )
        .bind(role_id)
        .bind(permission_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Create a custom role
    pub async fn create_role(
        &self,
        actor: &Actor,
        input: CreateRoleInput,
    ) -> AppResult<RoleWithPermissions> {
        let name = check_role_name(&input.name)?;
        self.check_name_free(&name, None).await?;
        self.check_permission_ids(&input.permission_ids).await?;

        let mut tx = self.db.begin().await?;

        let role_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO roles (name, description, is_system_role)
            VALUES ($1, $2, false)
            RETURNING id
            "#,
        )
        .bind(&name)
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await?;

        Self::replace_permissions(&mut tx, role_id, &input.permission_ids).await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "role", role_id).with_details(json!({
                "name": name,
                "permission_ids": input.permission_ids,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(role_id = %role_id, name = %name, "Role created");
        self.get_role_with_permissions(role_id).await
    }

    /// Update a role. System roles keep their name, and the admin role
    /// keeps its full permission set.
    pub async fn update_role(
        &self,
        actor: &Actor,
        role_id: Uuid,
        input: UpdateRoleInput,
    ) -> AppResult<RoleWithPermissions> {
        let existing = self.get_role(role_id).await?;

        if existing.is_system_role && input.name.is_some() {
            return Err(AppError::validation("name", "Cannot rename system roles"));
        }
        if existing.name == SystemRole::Admin.as_str() && input.permission_ids.is_some() {
            return Err(AppError::validation(
                "permission_ids",
                "The admin role always has every permission",
            ));
        }

        let name = match &input.name {
            Some(name) => {
                let name = check_role_name(name)?;
                self.check_name_free(&name, Some(role_id)).await?;
                Some(name)
            }
            None => None,
        };

        if let Some(permission_ids) = &input.permission_ids {
            self.check_permission_ids(permission_ids).await?;
        }

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE roles
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(role_id)
        .bind(&name)
        .bind(&input.description)
        .execute(&mut *tx)
        .await?;

        if let Some(permission_ids) = &input.permission_ids {
            Self::replace_permissions(&mut tx, role_id, permission_ids).await?;
        }

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("update", "role", role_id).with_details(json!({
                "name": name,
                "permission_ids": input.permission_ids,
            })),
        )
        .await?;

        tx.commit().await?;

        self.get_role_with_permissions(role_id).await
    }

    /// Delete a custom role (system roles cannot be deleted)
    pub async fn delete_role(&self, actor: &Actor, role_id: Uuid) -> AppResult<()> {
        let role = self.get_role(role_id).await?;

        if role.is_system_role {
            return Err(AppError::validation("id", "Cannot delete system roles"));
        }

        if role.user_count > 0 {
            return Err(AppError::conflict(
                "role",
                format!(
                    "Cannot delete role: {} users are assigned to it",
                    role.user_count
                ),
            ));
        }

        let mut tx = self.db.begin().await?;

        // Cascade removes role_permissions
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "role", role_id).with_details(json!({"name": role.name})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(role_id = %role_id, "Role deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_role_names_rejected() {
        for name in ["admin", "Manager", " VIEWER "] {
            assert!(check_role_name(name).is_err(), "{} should be reserved", name);
        }
        assert_eq!(check_role_name("  Dispatcher ").unwrap(), "Dispatcher");
        assert!(check_role_name("   ").is_err());
    }
}
