//! Audit record row model.
//!
//! Append-only: this module deliberately defines no UPDATE or DELETE
//! statements for the `audit_records` table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use gatewarden_access::{Actor, AuditAction, AuditRecord, FieldChange, RequestOrigin};

use crate::error::DbError;

/// A row of the `audit_records` table.
#[derive(Debug, Clone, FromRow)]
pub struct AuditRecordRow {
    pub id: Uuid,
    pub action: String,
    pub link_id: Uuid,
    pub link_code: Option<String>,
    pub link_name: Option<String>,
    pub actor_id: String,
    pub actor_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub changes: Option<serde_json::Value>,
    pub context: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecordRow {
    /// Append a record.
    pub async fn insert(pool: &PgPool, row: &Self) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO audit_records (
                id, action, link_id, link_code, link_name,
                actor_id, actor_name, ip_address, user_agent,
                changes, context, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(&row.action)
        .bind(row.link_id)
        .bind(&row.link_code)
        .bind(&row.link_name)
        .bind(&row.actor_id)
        .bind(&row.actor_name)
        .bind(&row.ip_address)
        .bind(&row.user_agent)
        .bind(&row.changes)
        .bind(&row.context)
        .bind(row.occurred_at)
        .fetch_one(pool)
        .await
    }

    /// List records for a link, newest first.
    pub async fn list_for_link(
        pool: &PgPool,
        link_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM audit_records
            WHERE link_id = $1
            ORDER BY occurred_at DESC
            LIMIT $2
            "#,
        )
        .bind(link_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Find a record by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM audit_records
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Map the row back into the domain record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] when the stored action or changes
    /// payload is unrecognized.
    pub fn into_domain(self) -> Result<AuditRecord, DbError> {
        let action = parse_action(&self.action)?;
        let changes: Option<HashMap<String, FieldChange>> = self
            .changes
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| DbError::InvalidColumn(format!("bad changes payload: {e}")))?;

        Ok(AuditRecord {
            id: self.id.into(),
            action,
            link_id: self.link_id.into(),
            link_code: self.link_code,
            link_name: self.link_name,
            actor: Actor {
                id: self.actor_id,
                name: self.actor_name,
            },
            origin: RequestOrigin {
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
            changes,
            context: self.context,
            occurred_at: self.occurred_at,
        })
    }
}

/// Rebuild an action from its stored string.
fn parse_action(action: &str) -> Result<AuditAction, DbError> {
    match action {
        "created" => Ok(AuditAction::Created),
        "updated" => Ok(AuditAction::Updated),
        "disabled" => Ok(AuditAction::Disabled),
        "enabled" => Ok(AuditAction::Enabled),
        "deleted" => Ok(AuditAction::Deleted),
        "code_regenerated" => Ok(AuditAction::CodeRegenerated),
        "status_recalculated" => Ok(AuditAction::StatusRecalculated),
        other => Err(DbError::InvalidColumn(format!("unknown action '{other}'"))),
    }
}
