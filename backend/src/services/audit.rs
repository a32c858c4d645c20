//! Audit trail: one row per mutation, login and signature

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use shared::{PaginatedResponse, Pagination};

use crate::error::AppResult;

/// Who performed an action and from where
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub ip: Option<String>,
}

impl Actor {
    pub fn user(user_id: Uuid, ip: Option<String>) -> Self {
        Self {
            user_id: Some(user_id),
            ip,
        }
    }

    /// Unauthenticated caller, e.g. a driver following a signing link
    pub fn anonymous(ip: Option<String>) -> Self {
        Self { user_id: None, ip }
    }
}

/// A single audit entry about to be written
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(action: &'static str, entity_type: &'static str, entity_id: Uuid) -> Self {
        Self {
            action,
            entity_type,
            entity_id: Some(entity_id),
            details: Value::Object(Default::default()),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Write an audit row. Pass a transaction to make the entry part of the
/// surrounding change.
pub async fn record<'e, E>(executor: E, actor: &Actor, event: AuditEvent) -> AppResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_logs (actor_id, action, entity_type, entity_id, details, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(actor.user_id)
    .bind(event.action)
    .bind(event.entity_type)
    .bind(event.entity_id)
    .bind(&event.details)
    .bind(&actor.ip)
    .execute(executor)
    .await?;

    tracing::debug!(
        action = event.action,
        entity_type = event.entity_type,
        entity_id = ?event.entity_id,
        "Audit entry recorded"
    );
    Ok(())
}

/// Audit log row
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filters for listing audit entries
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Read side of the audit trail
#[derive(Clone)]
pub struct AuditService {
    db: PgPool,
}

impl AuditService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AuditLogQuery) {
        builder.push(" WHERE 1 = 1");
        if let Some(entity_type) = &query.entity_type {
            builder.push(" AND a.entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(entity_id) = query.entity_id {
            builder.push(" AND a.entity_id = ").push_bind(entity_id);
        }
        if let Some(actor_id) = query.actor_id {
            builder.push(" AND a.actor_id = ").push_bind(actor_id);
        }
        if let Some(action) = &query.action {
            builder.push(" AND a.action = ").push_bind(action.clone());
        }
        if let Some(from) = query.from {
            builder.push(" AND a.created_at >= ").push_bind(from);
        }
        if let Some(to) = query.to {
            builder
                .push(" AND a.created_at < ")
                .push_bind(to)
                .push(" + INTERVAL '1 day'");
        }
    }

    /// List audit entries, newest first
    pub async fn list(&self, query: &AuditLogQuery) -> AppResult<PaginatedResponse<AuditLog>> {
        let pagination = Pagination::from_query(query.page, query.per_page);

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs a");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut select = QueryBuilder::new(
            r#"
            SELECT a.id, a.actor_id, u.name AS actor_name, a.action, a.entity_type,
                   a.entity_id, a.details, a.ip_address, a.created_at
            FROM audit_logs a
            LEFT JOIN users u ON u.id = a.actor_id
            "#,
        );
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY a.created_at DESC LIMIT ")
            .push_bind(pagination.limit())
            .push(" OFFSET ")
            .push_bind(pagination.offset());

        let logs = select
            .build_query_as::<AuditLog>()
            .fetch_all(&self.db)
            .await?;

        Ok(PaginatedResponse::new(logs, &pagination, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_defaults_to_empty_details() {
        let id = Uuid::new_v4();
        let event = AuditEvent::new("create", "vehicle", id);
        assert_eq!(event.entity_id, Some(id));
        assert_eq!(event.details, json!({}));

        let event = event.with_details(json!({"registration": "AB12CDE"}));
        assert_eq!(event.details["registration"], "AB12CDE");
    }

    #[test]
    fn test_filters_bind_in_order() {
        let query = AuditLogQuery {
            entity_type: Some("vehicle".into()),
            actor_id: Some(Uuid::nil()),
            ..Default::default()
        };
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs a");
        AuditService::push_filters(&mut builder, &query);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM audit_logs a WHERE 1 = 1 AND a.entity_type = $1 AND a.actor_id = $2"
        );
    }
}
