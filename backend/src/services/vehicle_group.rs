//! Vehicle group service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::audit::{self, Actor, AuditEvent};

/// Vehicle group service
#[derive(Clone)]
pub struct VehicleGroupService {
    db: PgPool,
}

/// Vehicle group with its vehicle count
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct VehicleGroup {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub colour: Option<String>,
    pub vehicle_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a group
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupInput {
    #[validate(length(min = 1, max = 100, message = "Group name must be between 1 and 100 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(max = 20, message = "Colour is too long"))]
    pub colour: Option<String>,
}

/// Input for updating a group
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGroupInput {
    #[validate(length(min = 1, max = 100, message = "Group name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 20, message = "Colour is too long"))]
    pub colour: Option<String>,
}

const GROUP_SELECT: &str = r#"
    SELECT g.id, g.name, g.description, g.colour,
           (SELECT COUNT(*) FROM vehicles v WHERE v.group_id = g.id) AS vehicle_count,
           g.created_at, g.updated_at
    FROM vehicle_groups g
"#;

impl VehicleGroupService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All groups ordered by name
    pub async fn list_groups(&self) -> AppResult<Vec<VehicleGroup>> {
        let sql = format!("{} ORDER BY g.name ASC", GROUP_SELECT);
        let groups = sqlx::query_as::<_, VehicleGroup>(&sql)
            .fetch_all(&self.db)
            .await?;
        Ok(groups)
    }

    pub async fn get_group(&self, group_id: Uuid) -> AppResult<VehicleGroup> {
        let sql = format!("{} WHERE g.id = $1", GROUP_SELECT);
        sqlx::query_as::<_, VehicleGroup>(&sql)
            .bind(group_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Vehicle group".to_string()))
    }

    async fn check_name_free(&self, name: &str, except: Option<Uuid>) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM vehicle_groups
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

    pub async fn create_group(&self, actor: &Actor, input: CreateGroupInput) -> AppResult<VehicleGroup> {
        input.validate()?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("name", "Group name is required"));
        }
        self.check_name_free(name, None).await?;

        let mut tx = self.db.begin().await?;

        let group_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO vehicle_groups (name, description, colour)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(&input.description)
        .bind(&input.colour)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("create", "vehicle_group", group_id).with_details(json!({"name": name})),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(group_id = %group_id, "Vehicle group created");
        self.get_group(group_id).await
    }

    pub async fn update_group(
        &self,
        actor: &Actor,
        group_id: Uuid,
        input: UpdateGroupInput,
    ) -> AppResult<VehicleGroup> {
        input.validate()?;
        self.get_group(group_id).await?;

        let name = input.name.as_deref().map(str::trim);
        if let Some(name) = name {
            if name.is_empty() {
                return Err(AppError::validation("name", "Group name is required"));
            }
            self.check_name_free(name, Some(group_id)).await?;
        }

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE vehicle_groups SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                colour = COALESCE($4, colour),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(group_id)
        .bind(name)
        .bind(&input.description)
        .bind(&input.colour)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("update", "vehicle_group", group_id).with_details(json!({
                "name": name,
                "description": input.description,
                "colour": input.colour,
            })),
        )
        .await?;

        tx.commit().await?;

        self.get_group(group_id).await
    }

    /// Delete a group. Member vehicles stay, detached from the group.
    pub async fn delete_group(&self, actor: &Actor, group_id: Uuid) -> AppResult<()> {
        let group = self.get_group(group_id).await?;

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE vehicles SET group_id = NULL, updated_at = NOW() WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM vehicle_groups WHERE id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut *tx,
            actor,
            AuditEvent::new("delete", "vehicle_group", group_id).with_details(json!({
                "name": group.name,
                "detached_vehicles": group.vehicle_count,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            group_id = %group_id,
            detached = group.vehicle_count,
            "Vehicle group deleted"
        );
        Ok(())
    }
}
