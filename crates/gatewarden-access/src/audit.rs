//! Audit trail for access-link mutations.
//!
//! Every creation and transition appends an immutable record carrying the
//! acting identity, request origin, and a full old/new field diff. The store
//! surface is write-only plus reads; records are never updated or deleted.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{Actor, AuditRecordId, LinkId, RequestOrigin};

/// Action recorded against an access link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Link was created.
    #[default]
    Created,
    /// Link fields were edited.
    Updated,
    /// Link was manually disabled.
    Disabled,
    /// Link was re-enabled from the disabled override.
    Enabled,
    /// Link was soft-deleted.
    Deleted,
    /// Link code was regenerated.
    CodeRegenerated,
    /// Status changed through recalculation (reconciler sweep or a
    /// counter-threshold flip on grant).
    StatusRecalculated,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Disabled => write!(f, "disabled"),
            Self::Enabled => write!(f, "enabled"),
            Self::Deleted => write!(f, "deleted"),
            Self::CodeRegenerated => write!(f, "code_regenerated"),
            Self::StatusRecalculated => write!(f, "status_recalculated"),
        }
    }
}

/// Old/new pair for a single changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

/// Build a [`FieldChange`] from any two serializable values.
pub fn field_change<O: Serialize, N: Serialize>(old: O, new: N) -> FieldChange {
    FieldChange {
        old: serde_json::to_value(old).unwrap_or_default(),
        new: serde_json::to_value(new).unwrap_or_default(),
    }
}

/// An immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique identifier for the record.
    pub id: AuditRecordId,
    /// Action performed.
    pub action: AuditAction,
    /// The link involved.
    pub link_id: LinkId,
    /// Link code at the time of the action, for reads after regeneration.
    pub link_code: Option<String>,
    /// Link name at the time of the action.
    pub link_name: Option<String>,
    /// Who performed the action.
    pub actor: Actor,
    /// Where the request came from.
    pub origin: RequestOrigin,
    /// Old/new values for changed fields.
    pub changes: Option<HashMap<String, FieldChange>>,
    /// Free-form context about the action.
    pub context: Option<serde_json::Value>,
    /// When the action happened.
    pub occurred_at: DateTime<Utc>,
}

/// Input for appending an audit record.
#[derive(Debug, Clone, Default)]
pub struct AuditRecordInput {
    pub action: AuditAction,
    pub link_id: LinkId,
    pub link_code: Option<String>,
    pub link_name: Option<String>,
    pub actor: Actor,
    pub origin: RequestOrigin,
    pub changes: Option<HashMap<String, FieldChange>>,
    pub context: Option<serde_json::Value>,
}

/// Trait for audit record storage backends.
#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an audit record. The only write this surface offers.
    async fn append(&self, input: AuditRecordInput) -> Result<AuditRecord>;

    /// List records for a link, newest first.
    async fn list_for_link(&self, link_id: LinkId, limit: usize) -> Result<Vec<AuditRecord>>;

    /// Get a specific record by ID.
    async fn get(&self, id: AuditRecordId) -> Result<Option<AuditRecord>>;
}

/// In-memory audit store for testing.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditStore {
    /// Create a new in-memory audit store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Number of records appended so far.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clear all records (for testing).
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, input: AuditRecordInput) -> Result<AuditRecord> {
        let record = AuditRecord {
            id: AuditRecordId::new(),
            action: input.action,
            link_id: input.link_id,
            link_code: input.link_code,
            link_name: input.link_name,
            actor: input.actor,
            origin: input.origin,
            changes: input.changes,
            context: input.context,
            occurred_at: Utc::now(),
        };

        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_for_link(&self, link_id: LinkId, limit: usize) -> Result<Vec<AuditRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<AuditRecord> = records
            .iter()
            .filter(|r| r.link_id == link_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn get(&self, id: AuditRecordId) -> Result<Option<AuditRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }
}
