//! Access attempt row model. Append-only, like the audit records.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use gatewarden_access::{AccessAttempt, AttemptOutcome, DenialReason, RequestOrigin};

use crate::error::DbError;

/// A row of the `access_attempts` table.
#[derive(Debug, Clone, FromRow)]
pub struct AccessAttemptRow {
    pub id: Uuid,
    pub link_id: Option<Uuid>,
    pub code_used: String,
    pub outcome: String,
    pub denial_reason: Option<String>,
    pub error_message: Option<String>,
    pub actuation_ms: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AccessAttemptRow {
    /// Append an attempt record.
    pub async fn insert(pool: &PgPool, row: &Self) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO access_attempts (
                id, link_id, code_used, outcome, denial_reason,
                error_message, actuation_ms, ip_address, user_agent, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.link_id)
        .bind(&row.code_used)
        .bind(&row.outcome)
        .bind(&row.denial_reason)
        .bind(&row.error_message)
        .bind(row.actuation_ms)
        .bind(&row.ip_address)
        .bind(&row.user_agent)
        .bind(row.occurred_at)
        .fetch_one(pool)
        .await
    }

    /// List attempts for a link, newest first.
    pub async fn list_for_link(
        pool: &PgPool,
        link_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM access_attempts
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

    /// Map the row back into the domain record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] when a stored enum value is
    /// unrecognized.
    pub fn into_domain(self) -> Result<AccessAttempt, DbError> {
        Ok(AccessAttempt {
            id: self.id.into(),
            link_id: self.link_id.map(Into::into),
            code_used: self.code_used,
            outcome: parse_outcome(&self.outcome)?,
            denial_reason: self
                .denial_reason
                .as_deref()
                .map(parse_denial_reason)
                .transpose()?,
            error_message: self.error_message,
            actuation_ms: self.actuation_ms,
            origin: RequestOrigin {
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
            occurred_at: self.occurred_at,
        })
    }
}

/// Rebuild an outcome from its stored string.
fn parse_outcome(outcome: &str) -> Result<AttemptOutcome, DbError> {
    match outcome {
        "granted" => Ok(AttemptOutcome::Granted),
        "denied" => Ok(AttemptOutcome::Denied),
        "error" => Ok(AttemptOutcome::Error),
        other => Err(DbError::InvalidColumn(format!("unknown outcome '{other}'"))),
    }
}

/// Rebuild a denial reason from its stored string.
fn parse_denial_reason(reason: &str) -> Result<DenialReason, DbError> {
    match reason {
        "invalid_code" => Ok(DenialReason::InvalidCode),
        "deleted" => Ok(DenialReason::Deleted),
        "disabled" => Ok(DenialReason::Disabled),
        "cooldown" => Ok(DenialReason::Cooldown),
        "not_yet_active" => Ok(DenialReason::NotYetActive),
        "expired" => Ok(DenialReason::Expired),
        "exhausted" => Ok(DenialReason::Exhausted),
        "other" => Ok(DenialReason::Other),
        other => Err(DbError::InvalidColumn(format!(
            "unknown denial_reason '{other}'"
        ))),
    }
}
