//! Access link row model.
//!
//! The domain's tagged status splits into two TEXT columns here: `status`
//! holds the kind and `inactive_reason` the sub-reason, populated iff the
//! status is `inactive`.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use gatewarden_access::{AccessLink, Actor, InactiveReason, LinkPurpose, LinkStatus};

use crate::error::DbError;

/// A row of the `access_links` table.
#[derive(Debug, Clone, FromRow)]
pub struct AccessLinkRow {
    pub id: Uuid,
    pub name: String,
    pub notes: Option<String>,
    pub purpose: String,
    pub code: String,
    pub status: String,
    pub inactive_reason: Option<String>,
    pub active_on: Option<DateTime<Utc>>,
    pub expiration: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub granted_count: i64,
    pub denied_count: i64,
    pub last_granted_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub auto_open: bool,
    pub owner_id: String,
    pub owner_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessLinkRow {
    /// Find a link by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM access_links
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Find a link by its access code.
    pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM access_links
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(pool)
        .await
    }

    /// Insert a new link. The unique index on `code` rejects collisions.
    pub async fn insert(pool: &PgPool, row: &Self) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO access_links (
                id, name, notes, purpose, code, status, inactive_reason,
                active_on, expiration, max_uses, granted_count, denied_count,
                last_granted_at, deleted_at, auto_open, owner_id, owner_name,
                created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.notes)
        .bind(&row.purpose)
        .bind(&row.code)
        .bind(&row.status)
        .bind(&row.inactive_reason)
        .bind(row.active_on)
        .bind(row.expiration)
        .bind(row.max_uses)
        .bind(row.granted_count)
        .bind(row.denied_count)
        .bind(row.last_granted_at)
        .bind(row.deleted_at)
        .bind(row.auto_open)
        .bind(&row.owner_id)
        .bind(&row.owner_name)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Persist a full-row update. Owner and creation time are immutable.
    pub async fn update(pool: &PgPool, row: &Self) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE access_links SET
                name = $2,
                notes = $3,
                purpose = $4,
                code = $5,
                status = $6,
                inactive_reason = $7,
                active_on = $8,
                expiration = $9,
                max_uses = $10,
                granted_count = $11,
                denied_count = $12,
                last_granted_at = $13,
                deleted_at = $14,
                auto_open = $15,
                updated_at = $16
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.notes)
        .bind(&row.purpose)
        .bind(&row.code)
        .bind(&row.status)
        .bind(&row.inactive_reason)
        .bind(row.active_on)
        .bind(row.expiration)
        .bind(row.max_uses)
        .bind(row.granted_count)
        .bind(row.denied_count)
        .bind(row.last_granted_at)
        .bind(row.deleted_at)
        .bind(row.auto_open)
        .bind(row.updated_at)
        .fetch_optional(pool)
        .await
    }

    /// List links, newest first, optionally filtered by purpose.
    pub async fn list(
        pool: &PgPool,
        include_deleted: bool,
        purpose: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match purpose {
            Some(purpose) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM access_links
                    WHERE ($1 OR status <> 'deleted') AND purpose = $2
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(include_deleted)
                .bind(purpose)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM access_links
                    WHERE $1 OR status <> 'deleted'
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(include_deleted)
                .fetch_all(pool)
                .await
            }
        }
    }

    /// Links whose persisted status is `active`, the reconciliation set.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM access_links
            WHERE status = 'active'
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Atomically consume one use.
    ///
    /// The conditional update is the per-link serialization point: status,
    /// activation window, counter headroom, and cooldown are all re-checked
    /// in the same statement that increments, and an exhaustion flip lands in
    /// the same write. Returns the updated row, or `None` when any condition
    /// failed.
    ///
    /// `cooldown_cutoff` is `now - cooldown`; a prior grant after the cutoff
    /// blocks the consume.
    pub async fn try_consume_use(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
        cooldown_cutoff: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE access_links SET
                granted_count = granted_count + 1,
                last_granted_at = $2,
                updated_at = $2,
                status = CASE
                    WHEN max_uses IS NOT NULL AND granted_count + 1 >= max_uses
                    THEN 'inactive' ELSE status
                END,
                inactive_reason = CASE
                    WHEN max_uses IS NOT NULL AND granted_count + 1 >= max_uses
                    THEN 'exhausted' ELSE inactive_reason
                END
            WHERE id = $1
              AND status = 'active'
              AND (active_on IS NULL OR active_on <= $2)
              AND (expiration IS NULL OR expiration >= $2)
              AND (max_uses IS NULL OR granted_count < max_uses)
              AND ($3::timestamptz IS NULL
                   OR last_granted_at IS NULL
                   OR last_granted_at <= $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(cooldown_cutoff)
        .fetch_optional(pool)
        .await
    }

    /// Increment the denial counter.
    pub async fn increment_denied(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE access_links SET
                denied_count = denied_count + 1,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Build a row from the domain entity.
    #[must_use]
    pub fn from_domain(link: &AccessLink) -> Self {
        let (status, inactive_reason) = status_columns(link.status);
        Self {
            id: link.id.into_inner(),
            name: link.name.clone(),
            notes: link.notes.clone(),
            purpose: link.purpose.as_str().to_string(),
            code: link.code.clone(),
            status: status.to_string(),
            inactive_reason: inactive_reason.map(str::to_string),
            active_on: link.active_on,
            expiration: link.expiration,
            max_uses: link.max_uses,
            granted_count: link.granted_count,
            denied_count: link.denied_count,
            last_granted_at: link.last_granted_at,
            deleted_at: link.deleted_at,
            auto_open: link.auto_open,
            owner_id: link.owner.id.clone(),
            owner_name: link.owner.name.clone(),
            created_at: link.created_at,
            updated_at: link.updated_at,
        }
    }

    /// Map the row back into the domain entity.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] when a stored enum value is
    /// unrecognized.
    pub fn into_domain(self) -> Result<AccessLink, DbError> {
        let status = parse_status(&self.status, self.inactive_reason.as_deref())?;
        let purpose = parse_purpose(&self.purpose)?;

        Ok(AccessLink {
            id: self.id.into(),
            name: self.name,
            notes: self.notes,
            purpose,
            code: self.code,
            status,
            active_on: self.active_on,
            expiration: self.expiration,
            max_uses: self.max_uses,
            granted_count: self.granted_count,
            denied_count: self.denied_count,
            last_granted_at: self.last_granted_at,
            deleted_at: self.deleted_at,
            auto_open: self.auto_open,
            owner: Actor {
                id: self.owner_id,
                name: self.owner_name,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    /// Whether this row is an exhausted-inactive one.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.status == "inactive" && self.inactive_reason.as_deref() == Some("exhausted")
    }
}

/// Split a domain status into its column pair.
fn status_columns(status: LinkStatus) -> (&'static str, Option<&'static str>) {
    match status {
        LinkStatus::Active => ("active", None),
        LinkStatus::Inactive(reason) => ("inactive", Some(reason.as_str())),
        LinkStatus::Disabled => ("disabled", None),
        LinkStatus::Deleted => ("deleted", None),
    }
}

/// Rebuild a domain status from its column pair.
fn parse_status(status: &str, inactive_reason: Option<&str>) -> Result<LinkStatus, DbError> {
    match status {
        "active" => Ok(LinkStatus::Active),
        "disabled" => Ok(LinkStatus::Disabled),
        "deleted" => Ok(LinkStatus::Deleted),
        "inactive" => match inactive_reason {
            Some("not_yet_active") => Ok(LinkStatus::Inactive(InactiveReason::NotYetActive)),
            Some("expired") => Ok(LinkStatus::Inactive(InactiveReason::Expired)),
            Some("exhausted") => Ok(LinkStatus::Inactive(InactiveReason::Exhausted)),
            other => Err(DbError::InvalidColumn(format!(
                "unknown inactive_reason {other:?}"
            ))),
        },
        other => Err(DbError::InvalidColumn(format!("unknown status '{other}'"))),
    }
}

/// Rebuild a purpose from its stored string.
fn parse_purpose(purpose: &str) -> Result<LinkPurpose, DbError> {
    match purpose {
        "delivery" => Ok(LinkPurpose::Delivery),
        "recurring_delivery" => Ok(LinkPurpose::RecurringDelivery),
        "visitor" => Ok(LinkPurpose::Visitor),
        "service" => Ok(LinkPurpose::Service),
        "emergency" => Ok(LinkPurpose::Emergency),
        "other" => Ok(LinkPurpose::Other),
        other => Err(DbError::InvalidColumn(format!("unknown purpose '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewarden_access::LinkId;

    fn domain_link(status: LinkStatus) -> AccessLink {
        let now = Utc::now();
        AccessLink {
            id: LinkId::new(),
            name: "Round trip".into(),
            notes: Some("ring twice".into()),
            purpose: LinkPurpose::Delivery,
            code: "RT1234".into(),
            status,
            active_on: Some(now),
            expiration: Some(now + chrono::Duration::hours(4)),
            max_uses: Some(5),
            granted_count: 2,
            denied_count: 1,
            last_granted_at: Some(now),
            deleted_at: None,
            auto_open: true,
            owner: Actor {
                id: "oidc|owner".into(),
                name: Some("Owner".into()),
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_round_trips_every_status_variant() {
        for status in [
            LinkStatus::Active,
            LinkStatus::Inactive(InactiveReason::NotYetActive),
            LinkStatus::Inactive(InactiveReason::Expired),
            LinkStatus::Inactive(InactiveReason::Exhausted),
            LinkStatus::Disabled,
            LinkStatus::Deleted,
        ] {
            let link = domain_link(status);
            let row = AccessLinkRow::from_domain(&link);
            let back = row.into_domain().unwrap();
            assert_eq!(back.status, status);
            assert_eq!(back.id, link.id);
            assert_eq!(back.purpose, link.purpose);
            assert_eq!(back.owner, link.owner);
        }
    }

    #[test]
    fn inactive_rows_carry_the_reason_column() {
        let link = domain_link(LinkStatus::Inactive(InactiveReason::Exhausted));
        let row = AccessLinkRow::from_domain(&link);
        assert_eq!(row.status, "inactive");
        assert_eq!(row.inactive_reason.as_deref(), Some("exhausted"));
        assert!(row.is_exhausted());

        let active = AccessLinkRow::from_domain(&domain_link(LinkStatus::Active));
        assert_eq!(active.inactive_reason, None);
        assert!(!active.is_exhausted());
    }

    #[test]
    fn unknown_stored_values_are_rejected() {
        let mut row = AccessLinkRow::from_domain(&domain_link(LinkStatus::Active));
        row.status = "frozen".into();
        assert!(matches!(
            row.clone().into_domain(),
            Err(DbError::InvalidColumn(_))
        ));

        row.status = "inactive".into();
        row.inactive_reason = None;
        assert!(matches!(row.into_domain(), Err(DbError::InvalidColumn(_))));
    }
}
