//! Access-link entity, storage trait, and lifecycle service.
//!
//! An access link is a shareable code granting temporary, revocable physical
//! access. This module owns the entity, the `LinkStore` persistence seam, an
//! in-memory store for tests, and the `LinkService` handling every
//! operator-driven mutation (create, edit, disable, enable, delete, code
//! regeneration) with audit records for each.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::audit::{field_change, AuditAction, AuditRecordInput, AuditStore, FieldChange};
use crate::config::AccessConfig;
use crate::decision::cooldown_remaining_secs;
use crate::error::{AccessError, Result};
use crate::status;
use crate::types::{Actor, InactiveReason, LinkId, LinkPurpose, LinkStatus, RequestOrigin};

/// Alphabet for generated access codes. Unambiguous, URL-safe.
const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Longest accepted custom code.
const MAX_CODE_LENGTH: usize = 50;

// ============================================================================
// Domain Types
// ============================================================================

/// An access link granting temporary gate access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLink {
    /// Unique identifier.
    pub id: LinkId,
    /// Friendly name shown to operators and visitors.
    pub name: String,
    /// Additional notes or instructions.
    pub notes: Option<String>,
    /// Purpose category.
    pub purpose: LinkPurpose,
    /// Public code used to request a gate-open. Unique among live links.
    pub code: String,
    /// Persisted status; a cache of [`status::calculate`]'s last result.
    pub status: LinkStatus,
    /// When the link becomes usable. `None` means immediately.
    pub active_on: Option<DateTime<Utc>>,
    /// When the link expires. `None` means never.
    pub expiration: Option<DateTime<Utc>>,
    /// Maximum grants allowed. `None` means unlimited.
    pub max_uses: Option<i64>,
    /// Times access was granted. Mutated only by the decision engine.
    pub granted_count: i64,
    /// Times access was denied. Mutated only by the decision engine.
    pub denied_count: i64,
    /// Timestamp of the most recent grant; the cooldown reference.
    pub last_granted_at: Option<DateTime<Utc>>,
    /// When the link was soft-deleted. Set iff status is `Deleted`.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Trigger the gate automatically when the link page is opened.
    pub auto_open: bool,
    /// Identity that created the link.
    pub owner: Actor,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
    /// When the link was last modified.
    pub updated_at: DateTime<Utc>,
}

impl AccessLink {
    /// Grants left before exhaustion, `None` when unbounded. Computed on
    /// demand, never stored.
    #[must_use]
    pub fn remaining_uses(&self) -> Option<i64> {
        self.max_uses.map(|max| (max - self.granted_count).max(0))
    }

    /// Total attempts recorded against this link.
    #[must_use]
    pub fn total_uses(&self) -> i64 {
        self.granted_count + self.denied_count
    }

    /// Whether the persisted status permits granting.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Input for creating an access link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateLinkInput {
    /// Friendly name for the link.
    pub name: String,
    /// Additional notes or instructions.
    pub notes: Option<String>,
    /// Purpose category.
    #[serde(default)]
    pub purpose: LinkPurpose,
    /// Custom access code. Generated when omitted.
    pub code: Option<String>,
    /// When the link becomes usable.
    pub active_on: Option<DateTime<Utc>>,
    /// When the link expires. Defaults per configuration when omitted.
    pub expiration: Option<DateTime<Utc>>,
    /// Maximum grants allowed.
    pub max_uses: Option<i64>,
    /// Trigger the gate automatically on link open.
    #[serde(default)]
    pub auto_open: bool,
}

/// Input for editing an access link. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLinkInput {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub purpose: Option<LinkPurpose>,
    pub active_on: Option<DateTime<Utc>>,
    pub expiration: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub auto_open: Option<bool>,
}

/// Filter options for listing links.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    /// Include soft-deleted links, hidden by default.
    pub include_deleted: bool,
    /// Restrict to a purpose category.
    pub purpose: Option<LinkPurpose>,
}

/// Result of the store-level conditional use consumption.
///
/// The consume is the serialization point for concurrent grants: the status,
/// cooldown, and counter re-checks happen atomically with the increment, so
/// two racing attempts can never both cross a max-uses boundary.
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    /// A use was consumed; `link` reflects the post-grant state.
    Consumed {
        link: AccessLink,
        /// This very grant pushed the counter to its limit.
        became_exhausted: bool,
    },
    /// A previous grant is still inside the cooldown window.
    CoolingDown { retry_after_secs: i64 },
    /// The counter had already reached `max_uses`.
    Exhausted,
    /// The link was not in a grantable state at consume time.
    NotUsable { status: LinkStatus },
}

// ============================================================================
// Store Trait
// ============================================================================

/// Trait for access-link storage backends.
#[async_trait::async_trait]
pub trait LinkStore: Send + Sync {
    /// Get a link by ID.
    async fn get(&self, id: LinkId) -> Result<Option<AccessLink>>;

    /// Get a link by its access code.
    async fn get_by_code(&self, code: &str) -> Result<Option<AccessLink>>;

    /// Insert a new link. Fails with [`AccessError::DuplicateCode`] if the
    /// code collides with a live link.
    async fn insert(&self, link: AccessLink) -> Result<AccessLink>;

    /// Persist a full-row update for an existing link.
    async fn update(&self, link: AccessLink) -> Result<AccessLink>;

    /// List links, newest first.
    async fn list(&self, filter: &LinkFilter) -> Result<Vec<AccessLink>>;

    /// Atomically re-check admission constraints and consume one use.
    ///
    /// Implementations MUST serialize the check-increment-persist sequence
    /// per link: a conditional update in the database, or a write lock held
    /// across the whole sequence in memory. At most `max_uses` grants ever
    /// succeed, regardless of concurrency.
    async fn try_consume_use(
        &self,
        id: LinkId,
        now: DateTime<Utc>,
        cooldown: Option<Duration>,
    ) -> Result<ConsumeOutcome>;

    /// Increment the denial counter.
    async fn record_denial(&self, id: LinkId, now: DateTime<Utc>) -> Result<()>;

    /// Links whose persisted status is `Active`, the reconciliation working
    /// set. Disabled and deleted links are skipped entirely.
    async fn list_persisted_active(&self) -> Result<Vec<AccessLink>>;

    /// Try to take the cross-replica reconciliation lock. Non-blocking.
    async fn try_sweep_lock(&self) -> Result<bool>;

    /// Release the reconciliation lock.
    async fn sweep_unlock(&self) -> Result<()>;
}

// ============================================================================
// In-Memory Store (for testing)
// ============================================================================

/// In-memory link store for testing.
///
/// A single `RwLock` over the link map doubles as the per-link serialization
/// required by [`LinkStore::try_consume_use`]: the write guard spans the
/// whole check-increment sequence.
#[derive(Debug, Default)]
pub struct InMemoryLinkStore {
    links: Arc<RwLock<HashMap<LinkId, AccessLink>>>,
    sweep_locked: AtomicBool,
}

impl InMemoryLinkStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            links: Arc::new(RwLock::new(HashMap::new())),
            sweep_locked: AtomicBool::new(false),
        }
    }

    /// Clear all links (for testing).
    pub async fn clear(&self) {
        self.links.write().await.clear();
    }
}

#[async_trait::async_trait]
impl LinkStore for InMemoryLinkStore {
    async fn get(&self, id: LinkId) -> Result<Option<AccessLink>> {
        Ok(self.links.read().await.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<AccessLink>> {
        let links = self.links.read().await;
        Ok(links.values().find(|l| l.code == code).cloned())
    }

    async fn insert(&self, link: AccessLink) -> Result<AccessLink> {
        let mut links = self.links.write().await;
        let collision = links
            .values()
            .any(|l| l.code == link.code && !l.status.is_deleted());
        if collision {
            return Err(AccessError::DuplicateCode);
        }
        links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn update(&self, link: AccessLink) -> Result<AccessLink> {
        let mut links = self.links.write().await;
        if !links.contains_key(&link.id) {
            return Err(AccessError::NotFound);
        }
        links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn list(&self, filter: &LinkFilter) -> Result<Vec<AccessLink>> {
        let links = self.links.read().await;
        let mut matching: Vec<AccessLink> = links
            .values()
            .filter(|l| filter.include_deleted || !l.status.is_deleted())
            .filter(|l| filter.purpose.is_none_or(|p| l.purpose == p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn try_consume_use(
        &self,
        id: LinkId,
        now: DateTime<Utc>,
        cooldown: Option<Duration>,
    ) -> Result<ConsumeOutcome> {
        let mut links = self.links.write().await;
        let link = links.get_mut(&id).ok_or(AccessError::NotFound)?;

        match status::calculate(link, now) {
            LinkStatus::Active => {}
            LinkStatus::Inactive(InactiveReason::Exhausted) => {
                return Ok(ConsumeOutcome::Exhausted)
            }
            other => return Ok(ConsumeOutcome::NotUsable { status: other }),
        }

        if let Some(wait) = cooldown_remaining_secs(link.last_granted_at, now, cooldown) {
            return Ok(ConsumeOutcome::CoolingDown {
                retry_after_secs: wait,
            });
        }

        link.granted_count += 1;
        link.last_granted_at = Some(now);
        link.updated_at = now;

        let became_exhausted = link.max_uses.is_some_and(|max| link.granted_count >= max);
        if became_exhausted {
            link.status = LinkStatus::Inactive(InactiveReason::Exhausted);
        }

        Ok(ConsumeOutcome::Consumed {
            link: link.clone(),
            became_exhausted,
        })
    }

    async fn record_denial(&self, id: LinkId, now: DateTime<Utc>) -> Result<()> {
        let mut links = self.links.write().await;
        let link = links.get_mut(&id).ok_or(AccessError::NotFound)?;
        link.denied_count += 1;
        link.updated_at = now;
        Ok(())
    }

    async fn list_persisted_active(&self) -> Result<Vec<AccessLink>> {
        let links = self.links.read().await;
        Ok(links
            .values()
            .filter(|l| l.status.is_active())
            .cloned()
            .collect())
    }

    async fn try_sweep_lock(&self) -> Result<bool> {
        Ok(self
            .sweep_locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }

    async fn sweep_unlock(&self) -> Result<()> {
        self.sweep_locked.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Service
// ============================================================================

/// Service for operator-driven link lifecycle operations.
pub struct LinkService {
    store: Arc<dyn LinkStore>,
    audit: Arc<dyn AuditStore>,
    config: AccessConfig,
}

impl LinkService {
    /// Create a new link service.
    pub fn new(store: Arc<dyn LinkStore>, audit: Arc<dyn AuditStore>, config: AccessConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// Create a new access link.
    ///
    /// Generates a unique code unless a custom one is supplied, applies the
    /// configured default expiration, and immediately recalculates status so
    /// a link created with violated constraints starts out inactive.
    pub async fn create(
        &self,
        input: CreateLinkInput,
        actor: &Actor,
        origin: &RequestOrigin,
    ) -> Result<AccessLink> {
        if input.name.trim().is_empty() {
            return Err(AccessError::Validation("link name must not be empty".into()));
        }
        if input.max_uses.is_some_and(|m| m < 0) {
            return Err(AccessError::Validation("max_uses must not be negative".into()));
        }

        let code = match input.code {
            Some(custom) => {
                validate_custom_code(&custom)?;
                if self.store.get_by_code(&custom).await?.is_some() {
                    return Err(AccessError::DuplicateCode);
                }
                custom
            }
            None => self.generate_unique_code().await?,
        };

        let now = Utc::now();
        let expiration = input.expiration.or_else(|| {
            self.config
                .default_expiration_hours
                .map(|hours| now + Duration::hours(hours))
        });

        let mut link = AccessLink {
            id: LinkId::new(),
            name: input.name,
            notes: input.notes,
            purpose: input.purpose,
            code,
            status: LinkStatus::Active,
            active_on: input.active_on,
            expiration,
            max_uses: input.max_uses,
            granted_count: 0,
            denied_count: 0,
            last_granted_at: None,
            deleted_at: None,
            auto_open: input.auto_open,
            owner: actor.clone(),
            created_at: now,
            updated_at: now,
        };

        // A link created with constraints already violated starts inactive.
        if let Some(settled) = status::recalculate(&link, now) {
            link.status = settled;
        }

        let link = self.store.insert(link).await?;

        tracing::info!(
            link_id = %link.id,
            code = %link.code,
            name = %link.name,
            status = %link.status,
            "Created new access link"
        );

        self.record_audit(AuditRecordInput {
            action: AuditAction::Created,
            link_id: link.id,
            link_code: Some(link.code.clone()),
            link_name: Some(link.name.clone()),
            actor: actor.clone(),
            origin: origin.clone(),
            changes: None,
            context: Some(serde_json::json!({
                "purpose": link.purpose,
                "status": link.status,
                "active_on": link.active_on,
                "expiration": link.expiration,
                "max_uses": link.max_uses,
                "auto_open": link.auto_open,
            })),
        })
        .await;

        Ok(link)
    }

    /// Edit link fields, recording a full old/new diff.
    ///
    /// Status is recalculated after the edit; an edit that reverses an
    /// inactivity condition (say, pushing the expiration out) reactivates the
    /// link, and the flip appears in the same diff.
    pub async fn update(
        &self,
        id: LinkId,
        input: UpdateLinkInput,
        actor: &Actor,
        origin: &RequestOrigin,
    ) -> Result<AccessLink> {
        let mut link = self.load_live(id).await?;
        let mut changes: HashMap<String, FieldChange> = HashMap::new();

        if let Some(name) = input.name {
            if name.trim().is_empty() {
                return Err(AccessError::Validation("link name must not be empty".into()));
            }
            if name != link.name {
                changes.insert("name".into(), field_change(&link.name, &name));
                link.name = name;
            }
        }
        if let Some(notes) = input.notes {
            if Some(&notes) != link.notes.as_ref() {
                changes.insert("notes".into(), field_change(&link.notes, &notes));
                link.notes = Some(notes);
            }
        }
        if let Some(purpose) = input.purpose {
            if purpose != link.purpose {
                changes.insert("purpose".into(), field_change(link.purpose, purpose));
                link.purpose = purpose;
            }
        }
        if let Some(active_on) = input.active_on {
            if Some(active_on) != link.active_on {
                changes.insert("active_on".into(), field_change(link.active_on, active_on));
                link.active_on = Some(active_on);
            }
        }
        if let Some(expiration) = input.expiration {
            if Some(expiration) != link.expiration {
                changes.insert(
                    "expiration".into(),
                    field_change(link.expiration, expiration),
                );
                link.expiration = Some(expiration);
            }
        }
        if let Some(max_uses) = input.max_uses {
            if max_uses < 0 {
                return Err(AccessError::Validation("max_uses must not be negative".into()));
            }
            if Some(max_uses) != link.max_uses {
                changes.insert("max_uses".into(), field_change(link.max_uses, max_uses));
                link.max_uses = Some(max_uses);
            }
        }
        if let Some(auto_open) = input.auto_open {
            if auto_open != link.auto_open {
                changes.insert("auto_open".into(), field_change(link.auto_open, auto_open));
                link.auto_open = auto_open;
            }
        }

        if changes.is_empty() {
            return Ok(link);
        }

        let now = Utc::now();
        if let Some(settled) = status::recalculate(&link, now) {
            changes.insert("status".into(), field_change(link.status, settled));
            link.status = settled;
        }
        link.updated_at = now;

        let link = self.store.update(link).await?;

        tracing::info!(
            link_id = %link.id,
            updated_fields = ?changes.keys().collect::<Vec<_>>(),
            status = %link.status,
            "Updated access link"
        );

        self.record_audit(AuditRecordInput {
            action: AuditAction::Updated,
            link_id: link.id,
            link_code: Some(link.code.clone()),
            link_name: Some(link.name.clone()),
            actor: actor.clone(),
            origin: origin.clone(),
            changes: Some(changes),
            context: None,
        })
        .await;

        Ok(link)
    }

    /// Manually disable a link. The override persists until [`Self::enable`].
    pub async fn disable(
        &self,
        id: LinkId,
        actor: &Actor,
        origin: &RequestOrigin,
    ) -> Result<AccessLink> {
        let mut link = self.load_live(id).await?;
        if link.status.is_disabled() {
            return Ok(link);
        }

        let old_status = link.status;
        link.status = LinkStatus::Disabled;
        link.updated_at = Utc::now();
        let link = self.store.update(link).await?;

        tracing::info!(link_id = %link.id, code = %link.code, "Disabled access link");

        self.record_audit(AuditRecordInput {
            action: AuditAction::Disabled,
            link_id: link.id,
            link_code: Some(link.code.clone()),
            link_name: Some(link.name.clone()),
            actor: actor.clone(),
            origin: origin.clone(),
            changes: Some(HashMap::from([(
                "status".into(),
                field_change(old_status, link.status),
            )])),
            context: None,
        })
        .await;

        Ok(link)
    }

    /// Clear the disabled override.
    ///
    /// The link settles to whatever the calculator computes at the enable
    /// instant; an exhausted or expired link comes back inactive, not
    /// force-activated.
    pub async fn enable(
        &self,
        id: LinkId,
        actor: &Actor,
        origin: &RequestOrigin,
    ) -> Result<AccessLink> {
        let mut link = self.load_live(id).await?;
        if !link.status.is_disabled() {
            return Ok(link);
        }

        let now = Utc::now();
        link.status = LinkStatus::Active;
        let settled = status::calculate(&link, now);
        link.status = settled;
        link.updated_at = now;
        let link = self.store.update(link).await?;

        tracing::info!(
            link_id = %link.id,
            code = %link.code,
            status = %link.status,
            "Enabled access link"
        );

        self.record_audit(AuditRecordInput {
            action: AuditAction::Enabled,
            link_id: link.id,
            link_code: Some(link.code.clone()),
            link_name: Some(link.name.clone()),
            actor: actor.clone(),
            origin: origin.clone(),
            changes: Some(HashMap::from([(
                "status".into(),
                field_change(LinkStatus::Disabled, link.status),
            )])),
            context: Some(serde_json::json!({ "resulting_status": link.status })),
        })
        .await;

        Ok(link)
    }

    /// Soft-delete a link. Terminal: no further mutation is accepted.
    pub async fn delete(
        &self,
        id: LinkId,
        actor: &Actor,
        origin: &RequestOrigin,
    ) -> Result<AccessLink> {
        let mut link = self.load_live(id).await?;

        let now = Utc::now();
        let old_status = link.status;
        link.status = LinkStatus::Deleted;
        link.deleted_at = Some(now);
        link.updated_at = now;
        let link = self.store.update(link).await?;

        tracing::info!(link_id = %link.id, code = %link.code, "Deleted access link");

        self.record_audit(AuditRecordInput {
            action: AuditAction::Deleted,
            link_id: link.id,
            link_code: Some(link.code.clone()),
            link_name: Some(link.name.clone()),
            actor: actor.clone(),
            origin: origin.clone(),
            changes: Some(HashMap::from([(
                "status".into(),
                field_change(old_status, link.status),
            )])),
            context: Some(serde_json::json!({
                "granted_count": link.granted_count,
                "denied_count": link.denied_count,
                "total_uses": link.total_uses(),
            })),
        })
        .await;

        Ok(link)
    }

    /// Replace the link's code with a freshly generated unique one.
    pub async fn regenerate_code(
        &self,
        id: LinkId,
        actor: &Actor,
        origin: &RequestOrigin,
    ) -> Result<AccessLink> {
        let mut link = self.load_live(id).await?;

        let new_code = self.generate_unique_code().await?;
        let old_code = std::mem::replace(&mut link.code, new_code);
        link.updated_at = Utc::now();
        let link = self.store.update(link).await?;

        tracing::info!(
            link_id = %link.id,
            old_code = %old_code,
            new_code = %link.code,
            "Regenerated link code"
        );

        self.record_audit(AuditRecordInput {
            action: AuditAction::CodeRegenerated,
            link_id: link.id,
            link_code: Some(link.code.clone()),
            link_name: Some(link.name.clone()),
            actor: actor.clone(),
            origin: origin.clone(),
            changes: Some(HashMap::from([(
                "code".into(),
                field_change(&old_code, &link.code),
            )])),
            context: None,
        })
        .await;

        Ok(link)
    }

    /// Get a link by ID.
    pub async fn get(&self, id: LinkId) -> Result<AccessLink> {
        self.store.get(id).await?.ok_or(AccessError::NotFound)
    }

    /// Get a link by its access code.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<AccessLink>> {
        self.store.get_by_code(code).await
    }

    /// List links, newest first.
    pub async fn list(&self, filter: &LinkFilter) -> Result<Vec<AccessLink>> {
        self.store.list(filter).await
    }

    /// Load a link, rejecting operations on deleted ones.
    async fn load_live(&self, id: LinkId) -> Result<AccessLink> {
        let link = self.store.get(id).await?.ok_or(AccessError::NotFound)?;
        if link.status.is_deleted() {
            return Err(AccessError::LinkDeleted);
        }
        Ok(link)
    }

    /// Generate a code that does not collide with any stored link.
    async fn generate_unique_code(&self) -> Result<String> {
        for attempt in 1..=self.config.code_generation_attempts {
            let code = random_code(self.config.code_length);
            if self.store.get_by_code(&code).await?.is_none() {
                return Ok(code);
            }
            tracing::warn!(attempt, code = %code, "Generated duplicate link code, retrying");
        }
        Err(AccessError::CodeGeneration(
            self.config.code_generation_attempts,
        ))
    }

    /// Append an audit record, logging loudly on failure.
    ///
    /// The primary mutation has already committed by the time this runs; a
    /// failed audit write must not reverse it, but it must be visible as a
    /// compliance gap.
    async fn record_audit(&self, input: AuditRecordInput) {
        let action = input.action;
        let link_id = input.link_id;
        if let Err(e) = self.audit.append(input).await {
            tracing::error!(
                target: "audit",
                link_id = %link_id,
                action = %action,
                error = %e,
                "Audit write failed; primary operation already committed"
            );
        }
    }
}

/// Generate a random code from the link alphabet.
fn random_code(length: usize) -> String {
    use rand::rngs::OsRng;
    use rand::Rng;

    (0..length)
        .map(|_| {
            let idx = OsRng.gen_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Validate an operator-supplied custom code.
fn validate_custom_code(code: &str) -> Result<()> {
    if code.len() < 4 || code.len() > MAX_CODE_LENGTH {
        return Err(AccessError::Validation(format!(
            "custom code must be between 4 and {MAX_CODE_LENGTH} characters"
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AccessError::Validation(
            "custom code may only contain letters, digits, '-' and '_'".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditStore;

    fn service() -> (LinkService, Arc<InMemoryLinkStore>, Arc<InMemoryAuditStore>) {
        let store = Arc::new(InMemoryLinkStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let service = LinkService::new(store.clone(), audit.clone(), AccessConfig::default());
        (service, store, audit)
    }

    fn operator() -> Actor {
        Actor {
            id: "oidc|operator-1".into(),
            name: Some("Operator".into()),
        }
    }

    #[tokio::test]
    async fn create_generates_code_and_applies_default_expiration() {
        let (service, _, audit) = service();

        let link = service
            .create(
                CreateLinkInput {
                    name: "Courier".into(),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();

        assert_eq!(link.code.len(), 8);
        assert!(link
            .code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert!(link.expiration.is_some(), "default expiration applied");
        assert_eq!(link.status, LinkStatus::Active);
        assert_eq!(link.owner, operator());
        assert_eq!(audit.count().await, 1);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_custom_code() {
        let (service, _, _) = service();

        service
            .create(
                CreateLinkInput {
                    name: "First".into(),
                    code: Some("GATE-2024".into()),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();

        let err = service
            .create(
                CreateLinkInput {
                    name: "Second".into(),
                    code: Some("GATE-2024".into()),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .expect_err("duplicate custom code");

        assert!(matches!(err, AccessError::DuplicateCode));
    }

    #[tokio::test]
    async fn create_rejects_malformed_custom_code() {
        let (service, _, _) = service();

        let err = service
            .create(
                CreateLinkInput {
                    name: "Bad".into(),
                    code: Some("a!".into()),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .expect_err("malformed code");

        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn create_demotes_immediately_when_constraints_already_violated() {
        let (service, _, _) = service();

        let link = service
            .create(
                CreateLinkInput {
                    name: "Already over".into(),
                    max_uses: Some(0),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();

        assert_eq!(
            link.status,
            LinkStatus::Inactive(InactiveReason::Exhausted)
        );
    }

    #[tokio::test]
    async fn update_records_field_diff_and_reactivates() {
        let (service, _, audit) = service();
        let now = Utc::now();

        let link = service
            .create(
                CreateLinkInput {
                    name: "Expired".into(),
                    expiration: Some(now - Duration::hours(1)),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();
        assert_eq!(link.status, LinkStatus::Inactive(InactiveReason::Expired));

        let updated = service
            .update(
                link.id,
                UpdateLinkInput {
                    expiration: Some(now + Duration::hours(4)),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();

        assert_eq!(updated.status, LinkStatus::Active, "edit reversed expiry");

        let records = audit.list_for_link(link.id, 10).await.unwrap();
        let update_record = records
            .iter()
            .find(|r| r.action == AuditAction::Updated)
            .expect("update audited");
        let changes = update_record.changes.as_ref().unwrap();
        assert!(changes.contains_key("expiration"));
        assert!(changes.contains_key("status"));
    }

    #[tokio::test]
    async fn disable_then_enable_settles_via_calculator() {
        let (service, _, _) = service();

        let link = service
            .create(
                CreateLinkInput {
                    name: "Toggle".into(),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();

        let disabled = service
            .disable(link.id, &operator(), &RequestOrigin::default())
            .await
            .unwrap();
        assert_eq!(disabled.status, LinkStatus::Disabled);

        let enabled = service
            .enable(link.id, &operator(), &RequestOrigin::default())
            .await
            .unwrap();
        assert_eq!(enabled.status, LinkStatus::Active);
    }

    #[tokio::test]
    async fn enable_does_not_force_activate_an_exhausted_link() {
        let (service, store, _) = service();

        let link = service
            .create(
                CreateLinkInput {
                    name: "One shot".into(),
                    max_uses: Some(1),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();

        // Consume the only use, then disable and re-enable.
        store
            .try_consume_use(link.id, Utc::now(), None)
            .await
            .unwrap();
        service
            .disable(link.id, &operator(), &RequestOrigin::default())
            .await
            .unwrap();

        let enabled = service
            .enable(link.id, &operator(), &RequestOrigin::default())
            .await
            .unwrap();
        assert_eq!(
            enabled.status,
            LinkStatus::Inactive(InactiveReason::Exhausted),
            "enable settles to the calculated status, not Active"
        );
    }

    #[tokio::test]
    async fn delete_is_terminal() {
        let (service, _, _) = service();

        let link = service
            .create(
                CreateLinkInput {
                    name: "Doomed".into(),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();

        let deleted = service
            .delete(link.id, &operator(), &RequestOrigin::default())
            .await
            .unwrap();
        assert_eq!(deleted.status, LinkStatus::Deleted);
        assert!(deleted.deleted_at.is_some());

        for result in [
            service
                .disable(link.id, &operator(), &RequestOrigin::default())
                .await,
            service
                .enable(link.id, &operator(), &RequestOrigin::default())
                .await,
            service
                .delete(link.id, &operator(), &RequestOrigin::default())
                .await,
            service
                .regenerate_code(link.id, &operator(), &RequestOrigin::default())
                .await,
        ] {
            assert!(matches!(result, Err(AccessError::LinkDeleted)));
        }

        assert_eq!(service.get(link.id).await.unwrap().status, LinkStatus::Deleted);
    }

    #[tokio::test]
    async fn regenerate_code_frees_the_old_code() {
        let (service, _, audit) = service();

        let link = service
            .create(
                CreateLinkInput {
                    name: "Rotating".into(),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();
        let old_code = link.code.clone();

        let rotated = service
            .regenerate_code(link.id, &operator(), &RequestOrigin::default())
            .await
            .unwrap();

        assert_ne!(rotated.code, old_code);
        assert!(service.get_by_code(&old_code).await.unwrap().is_none());
        assert!(service.get_by_code(&rotated.code).await.unwrap().is_some());

        let records = audit.list_for_link(link.id, 10).await.unwrap();
        assert!(records
            .iter()
            .any(|r| r.action == AuditAction::CodeRegenerated));
    }

    #[tokio::test]
    async fn consume_respects_cooldown_and_exhaustion() {
        let (service, store, _) = service();
        let now = Utc::now();
        let cooldown = Some(Duration::seconds(30));

        let link = service
            .create(
                CreateLinkInput {
                    name: "Limited".into(),
                    max_uses: Some(2),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();

        let first = store.try_consume_use(link.id, now, cooldown).await.unwrap();
        assert!(matches!(
            first,
            ConsumeOutcome::Consumed {
                became_exhausted: false,
                ..
            }
        ));

        // Immediately after a grant the cooldown blocks.
        let blocked = store
            .try_consume_use(link.id, now + Duration::seconds(10), cooldown)
            .await
            .unwrap();
        match blocked {
            ConsumeOutcome::CoolingDown { retry_after_secs } => {
                assert_eq!(retry_after_secs, 20);
            }
            other => panic!("expected cooldown, got {other:?}"),
        }

        // Past the window the second (final) use consumes and exhausts.
        let second = store
            .try_consume_use(link.id, now + Duration::seconds(31), cooldown)
            .await
            .unwrap();
        match second {
            ConsumeOutcome::Consumed {
                link,
                became_exhausted,
            } => {
                assert!(became_exhausted);
                assert_eq!(link.granted_count, 2);
                assert_eq!(link.remaining_uses(), Some(0));
                assert_eq!(
                    link.status,
                    LinkStatus::Inactive(InactiveReason::Exhausted)
                );
            }
            other => panic!("expected consume, got {other:?}"),
        }

        let third = store
            .try_consume_use(link.id, now + Duration::seconds(120), cooldown)
            .await
            .unwrap();
        assert!(matches!(third, ConsumeOutcome::Exhausted));
    }

    #[tokio::test]
    async fn consume_refuses_non_active_links() {
        let (service, store, _) = service();

        let link = service
            .create(
                CreateLinkInput {
                    name: "Off".into(),
                    ..Default::default()
                },
                &operator(),
                &RequestOrigin::default(),
            )
            .await
            .unwrap();
        service
            .disable(link.id, &operator(), &RequestOrigin::default())
            .await
            .unwrap();

        let outcome = store
            .try_consume_use(link.id, Utc::now(), None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ConsumeOutcome::NotUsable {
                status: LinkStatus::Disabled
            }
        ));
    }
}
