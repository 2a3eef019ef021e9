//! PostgreSQL implementations of the gatewarden-access storage traits.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use gatewarden_access::decision::cooldown_remaining_secs;
use gatewarden_access::{
    status, AccessAttempt, AccessAttemptInput, AccessError, AccessLink, AttemptStore,
    AuditRecord, AuditRecordId, AuditRecordInput, AuditStore, ConsumeOutcome, InactiveReason,
    LinkFilter, LinkId, LinkStatus, LinkStore,
};

use crate::error::DbError;
use crate::models::{AccessAttemptRow, AccessLinkRow, AuditRecordRow};

/// Advisory-lock key coordinating reconciliation sweeps across replicas.
const SWEEP_LOCK_KEY: i64 = 0x6761_7465_7761_7264; // "gateward"

/// Wrap a query failure as a domain storage error.
fn storage_err(e: sqlx::Error) -> AccessError {
    AccessError::storage(DbError::QueryFailed(e))
}

// ============================================================================
// Link store
// ============================================================================

/// PostgreSQL-backed [`LinkStore`].
#[derive(Debug, Clone)]
pub struct PgLinkStore {
    pool: PgPool,
}

impl PgLinkStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LinkStore for PgLinkStore {
    async fn get(&self, id: LinkId) -> Result<Option<AccessLink>, AccessError> {
        AccessLinkRow::find_by_id(&self.pool, id.into_inner())
            .await
            .map_err(storage_err)?
            .map(|row| row.into_domain().map_err(AccessError::storage))
            .transpose()
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<AccessLink>, AccessError> {
        AccessLinkRow::find_by_code(&self.pool, code)
            .await
            .map_err(storage_err)?
            .map(|row| row.into_domain().map_err(AccessError::storage))
            .transpose()
    }

    async fn insert(&self, link: AccessLink) -> Result<AccessLink, AccessError> {
        let row = AccessLinkRow::from_domain(&link);
        match AccessLinkRow::insert(&self.pool, &row).await {
            Ok(inserted) => inserted.into_domain().map_err(AccessError::storage),
            Err(e) => {
                let db_err = DbError::QueryFailed(e);
                if db_err.is_unique_violation() {
                    Err(AccessError::DuplicateCode)
                } else {
                    Err(AccessError::storage(db_err))
                }
            }
        }
    }

    async fn update(&self, link: AccessLink) -> Result<AccessLink, AccessError> {
        let row = AccessLinkRow::from_domain(&link);
        AccessLinkRow::update(&self.pool, &row)
            .await
            .map_err(storage_err)?
            .ok_or(AccessError::NotFound)?
            .into_domain()
            .map_err(AccessError::storage)
    }

    async fn list(&self, filter: &LinkFilter) -> Result<Vec<AccessLink>, AccessError> {
        let purpose = filter.purpose.map(|p| p.as_str());
        let rows = AccessLinkRow::list(&self.pool, filter.include_deleted, purpose)
            .await
            .map_err(storage_err)?;
        rows.into_iter()
            .map(|row| row.into_domain().map_err(AccessError::storage))
            .collect()
    }

    async fn try_consume_use(
        &self,
        id: LinkId,
        now: DateTime<Utc>,
        cooldown: Option<Duration>,
    ) -> Result<ConsumeOutcome, AccessError> {
        let cutoff = cooldown.map(|cd| now - cd);

        if let Some(row) =
            AccessLinkRow::try_consume_use(&self.pool, id.into_inner(), now, cutoff)
                .await
                .map_err(storage_err)?
        {
            let became_exhausted = row.is_exhausted();
            return Ok(ConsumeOutcome::Consumed {
                link: row.into_domain().map_err(AccessError::storage)?,
                became_exhausted,
            });
        }

        // The conditional update matched nothing; read the row once to say
        // which constraint refused it.
        let row = AccessLinkRow::find_by_id(&self.pool, id.into_inner())
            .await
            .map_err(storage_err)?
            .ok_or(AccessError::NotFound)?;
        let link = row.into_domain().map_err(AccessError::storage)?;

        match status::calculate(&link, now) {
            LinkStatus::Inactive(InactiveReason::Exhausted) => Ok(ConsumeOutcome::Exhausted),
            LinkStatus::Active => {
                if let Some(wait) = cooldown_remaining_secs(link.last_granted_at, now, cooldown)
                {
                    Ok(ConsumeOutcome::CoolingDown {
                        retry_after_secs: wait,
                    })
                } else {
                    // Lost a race with a concurrent consume between the two
                    // statements; report the stored status.
                    Ok(ConsumeOutcome::NotUsable {
                        status: link.status,
                    })
                }
            }
            other => Ok(ConsumeOutcome::NotUsable { status: other }),
        }
    }

    async fn record_denial(&self, id: LinkId, now: DateTime<Utc>) -> Result<(), AccessError> {
        let affected = AccessLinkRow::increment_denied(&self.pool, id.into_inner(), now)
            .await
            .map_err(storage_err)?;
        if affected == 0 {
            return Err(AccessError::NotFound);
        }
        Ok(())
    }

    async fn list_persisted_active(&self) -> Result<Vec<AccessLink>, AccessError> {
        let rows = AccessLinkRow::list_active(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.into_iter()
            .map(|row| row.into_domain().map_err(AccessError::storage))
            .collect()
    }

    async fn try_sweep_lock(&self) -> Result<bool, AccessError> {
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(SWEEP_LOCK_KEY)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(acquired)
    }

    async fn sweep_unlock(&self) -> Result<(), AccessError> {
        let (_released,): (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .bind(SWEEP_LOCK_KEY)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// ============================================================================
// Audit store
// ============================================================================

/// PostgreSQL-backed [`AuditStore`].
#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, input: AuditRecordInput) -> Result<AuditRecord, AccessError> {
        let changes = input
            .changes
            .map(|c| serde_json::to_value(c).unwrap_or_default());

        let row = AuditRecordRow {
            id: Uuid::new_v4(),
            action: input.action.to_string(),
            link_id: input.link_id.into_inner(),
            link_code: input.link_code,
            link_name: input.link_name,
            actor_id: input.actor.id,
            actor_name: input.actor.name,
            ip_address: input.origin.ip_address,
            user_agent: input.origin.user_agent,
            changes,
            context: input.context,
            occurred_at: Utc::now(),
        };

        AuditRecordRow::insert(&self.pool, &row)
            .await
            .map_err(storage_err)?
            .into_domain()
            .map_err(AccessError::storage)
    }

    async fn list_for_link(
        &self,
        link_id: LinkId,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, AccessError> {
        let rows = AuditRecordRow::list_for_link(&self.pool, link_id.into_inner(), limit as i64)
            .await
            .map_err(storage_err)?;
        rows.into_iter()
            .map(|row| row.into_domain().map_err(AccessError::storage))
            .collect()
    }

    async fn get(&self, id: AuditRecordId) -> Result<Option<AuditRecord>, AccessError> {
        AuditRecordRow::find_by_id(&self.pool, id.into_inner())
            .await
            .map_err(storage_err)?
            .map(|row| row.into_domain().map_err(AccessError::storage))
            .transpose()
    }
}

// ============================================================================
// Attempt store
// ============================================================================

/// PostgreSQL-backed [`AttemptStore`].
#[derive(Debug, Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AttemptStore for PgAttemptStore {
    async fn append(&self, input: AccessAttemptInput) -> Result<AccessAttempt, AccessError> {
        let row = AccessAttemptRow {
            id: Uuid::new_v4(),
            link_id: input.link_id.map(LinkId::into_inner),
            code_used: input.code_used,
            outcome: input.outcome.as_str().to_string(),
            denial_reason: input.denial_reason.map(|r| r.as_str().to_string()),
            error_message: input.error_message,
            actuation_ms: input.actuation_ms,
            ip_address: input.origin.ip_address,
            user_agent: input.origin.user_agent,
            occurred_at: Utc::now(),
        };

        AccessAttemptRow::insert(&self.pool, &row)
            .await
            .map_err(storage_err)?
            .into_domain()
            .map_err(AccessError::storage)
    }

    async fn list_for_link(
        &self,
        link_id: LinkId,
        limit: usize,
    ) -> Result<Vec<AccessAttempt>, AccessError> {
        let rows =
            AccessAttemptRow::list_for_link(&self.pool, link_id.into_inner(), limit as i64)
                .await
                .map_err(storage_err)?;
        rows.into_iter()
            .map(|row| row.into_domain().map_err(AccessError::storage))
            .collect()
    }
}
