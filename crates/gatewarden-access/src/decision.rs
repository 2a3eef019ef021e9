//! Access-decision engine.
//!
//! `evaluate` is the synchronous, side-effect-free admission check; the
//! `AccessService` wraps it with loading, race-free counter updates, gate
//! actuation, and attempt bookkeeping. A refused attempt is a first-class
//! outcome here, never an error, and is never retried.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use gatewarden_actuator::Actuator;

use crate::audit::{field_change, AuditAction, AuditRecordInput, AuditStore};
use crate::config::AccessConfig;
use crate::error::Result;
use crate::link::{AccessLink, ConsumeOutcome, LinkStore};
use crate::status;
use crate::types::{
    Actor, AttemptId, AttemptOutcome, DenialReason, InactiveReason, LinkId, LinkStatus,
    RequestOrigin,
};

/// External message when the gate hardware cannot be actuated. Device detail
/// stays in the logs.
const DEVICE_UNAVAILABLE_MESSAGE: &str = "Gate control system unavailable";

// ============================================================================
// Admission check
// ============================================================================

/// A refusal with its operator-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenialReason,
    pub message: String,
}

/// Seconds left in the cooldown window, `None` when clear.
///
/// Rounded up so the caller-facing wait time never understates the wait.
/// Public so storage backends can classify a lost conditional update with
/// the same math.
pub fn cooldown_remaining_secs(
    last_granted_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: Option<Duration>,
) -> Option<i64> {
    let cooldown = cooldown?;
    if cooldown <= Duration::zero() {
        return None;
    }
    let last = last_granted_at?;
    let elapsed = now - last;
    if elapsed >= cooldown {
        return None;
    }

    let remaining = cooldown - elapsed;
    let mut secs = remaining.num_seconds();
    if remaining > Duration::seconds(secs) {
        secs += 1;
    }
    Some(secs.max(1))
}

/// Map a non-grantable status to its denial.
fn denial_for_status(status: LinkStatus, link: &AccessLink) -> Denial {
    match status {
        LinkStatus::Deleted => Denial {
            reason: DenialReason::Deleted,
            message: "Link no longer exists".into(),
        },
        LinkStatus::Disabled => Denial {
            reason: DenialReason::Disabled,
            message: "Link has been disabled".into(),
        },
        LinkStatus::Inactive(InactiveReason::NotYetActive) => Denial {
            reason: DenialReason::NotYetActive,
            message: match link.active_on {
                Some(at) => format!("Link not active until {}", at.to_rfc3339()),
                None => "Link is not active yet".into(),
            },
        },
        LinkStatus::Inactive(InactiveReason::Expired) => Denial {
            reason: DenialReason::Expired,
            message: "Link has expired".into(),
        },
        LinkStatus::Inactive(InactiveReason::Exhausted) => Denial {
            reason: DenialReason::Exhausted,
            message: "Maximum uses exceeded".into(),
        },
        LinkStatus::Active => Denial {
            reason: DenialReason::Other,
            message: "Link is inactive".into(),
        },
    }
}

/// Check whether a link can grant access at `now`.
///
/// Synchronous and side-effect-free. Denial precedence: deleted, then
/// disabled, then cooldown, then the derived inactive reason.
pub fn evaluate(
    link: &AccessLink,
    now: DateTime<Utc>,
    cooldown: Option<Duration>,
) -> std::result::Result<(), Denial> {
    if link.status.is_deleted() {
        return Err(denial_for_status(LinkStatus::Deleted, link));
    }
    if link.status.is_disabled() {
        return Err(denial_for_status(LinkStatus::Disabled, link));
    }
    if let Some(wait) = cooldown_remaining_secs(link.last_granted_at, now, cooldown) {
        return Err(Denial {
            reason: DenialReason::Cooldown,
            message: format!("Please wait {wait} seconds before requesting access again"),
        });
    }
    match status::calculate(link, now) {
        LinkStatus::Active => Ok(()),
        other => Err(denial_for_status(other, link)),
    }
}

/// Result of a validation, exposing the link for boundary-layer rendering.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Option<DenialReason>,
    pub message: String,
    pub link: Option<AccessLink>,
}

/// Outcome of a full access request.
#[derive(Debug, Clone)]
pub enum AccessRequestOutcome {
    /// Access granted and the gate actuated.
    Granted {
        link: AccessLink,
        actuation_ms: u64,
    },
    /// Access refused; counters updated, attempt recorded.
    Denied {
        reason: DenialReason,
        message: String,
        link: Option<AccessLink>,
    },
    /// Admission succeeded but the gate hardware failed after retries. The
    /// consumed use is not returned.
    DeviceUnavailable {
        link: AccessLink,
        message: String,
    },
}

// ============================================================================
// Attempt log
// ============================================================================

/// A recorded access attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessAttempt {
    pub id: AttemptId,
    /// The link, when the code resolved to one.
    pub link_id: Option<LinkId>,
    /// The code presented, kept even when it resolves to nothing.
    pub code_used: String,
    pub outcome: AttemptOutcome,
    pub denial_reason: Option<DenialReason>,
    /// Actuation failure detail, for `Error` outcomes.
    pub error_message: Option<String>,
    /// Gate actuation latency for granted attempts, in milliseconds.
    pub actuation_ms: Option<i64>,
    pub origin: RequestOrigin,
    pub occurred_at: DateTime<Utc>,
}

/// Input for appending an attempt record.
#[derive(Debug, Clone)]
pub struct AccessAttemptInput {
    pub link_id: Option<LinkId>,
    pub code_used: String,
    pub outcome: AttemptOutcome,
    pub denial_reason: Option<DenialReason>,
    pub error_message: Option<String>,
    pub actuation_ms: Option<i64>,
    pub origin: RequestOrigin,
}

/// Trait for attempt-log storage backends. Append-only.
#[async_trait::async_trait]
pub trait AttemptStore: Send + Sync {
    /// Append an attempt record.
    async fn append(&self, input: AccessAttemptInput) -> Result<AccessAttempt>;

    /// List attempts for a link, newest first.
    async fn list_for_link(&self, link_id: LinkId, limit: usize) -> Result<Vec<AccessAttempt>>;
}

/// In-memory attempt log for testing.
#[derive(Debug, Default)]
pub struct InMemoryAttemptStore {
    attempts: Arc<RwLock<Vec<AccessAttempt>>>,
}

impl InMemoryAttemptStore {
    /// Create a new in-memory attempt log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Number of attempts recorded so far.
    pub async fn count(&self) -> usize {
        self.attempts.read().await.len()
    }

    /// All recorded attempts, oldest first (for testing).
    pub async fn all(&self) -> Vec<AccessAttempt> {
        self.attempts.read().await.clone()
    }
}

#[async_trait::async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn append(&self, input: AccessAttemptInput) -> Result<AccessAttempt> {
        let attempt = AccessAttempt {
            id: AttemptId::new(),
            link_id: input.link_id,
            code_used: input.code_used,
            outcome: input.outcome,
            denial_reason: input.denial_reason,
            error_message: input.error_message,
            actuation_ms: input.actuation_ms,
            origin: input.origin,
            occurred_at: Utc::now(),
        };
        self.attempts.write().await.push(attempt.clone());
        Ok(attempt)
    }

    async fn list_for_link(&self, link_id: LinkId, limit: usize) -> Result<Vec<AccessAttempt>> {
        let attempts = self.attempts.read().await;
        let mut matching: Vec<AccessAttempt> = attempts
            .iter()
            .filter(|a| a.link_id == Some(link_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

// ============================================================================
// Service
// ============================================================================

/// The runtime access-decision service.
pub struct AccessService {
    store: Arc<dyn LinkStore>,
    attempts: Arc<dyn AttemptStore>,
    audit: Arc<dyn AuditStore>,
    actuator: Arc<dyn Actuator>,
    config: AccessConfig,
}

impl AccessService {
    /// Create a new access service.
    pub fn new(
        store: Arc<dyn LinkStore>,
        attempts: Arc<dyn AttemptStore>,
        audit: Arc<dyn AuditStore>,
        actuator: Arc<dyn Actuator>,
        config: AccessConfig,
    ) -> Self {
        Self {
            store,
            attempts,
            audit,
            actuator,
            config,
        }
    }

    /// Check whether a code can grant access, without using it.
    pub async fn validate(&self, code: &str) -> Result<Decision> {
        let Some(link) = self.store.get_by_code(code).await? else {
            return Ok(Decision {
                allowed: false,
                reason: Some(DenialReason::InvalidCode),
                message: "Invalid link code".into(),
                link: None,
            });
        };

        match evaluate(&link, Utc::now(), self.config.cooldown()) {
            Ok(()) => Ok(Decision {
                allowed: true,
                reason: None,
                message: "Link is valid".into(),
                link: Some(link),
            }),
            Err(denial) => Ok(Decision {
                allowed: false,
                reason: Some(denial.reason),
                message: denial.message,
                link: Some(link),
            }),
        }
    }

    /// Process an access request end to end: validate, then grant or deny.
    pub async fn request_access(
        &self,
        code: &str,
        origin: &RequestOrigin,
    ) -> Result<AccessRequestOutcome> {
        let Some(link) = self.store.get_by_code(code).await? else {
            let denial = Denial {
                reason: DenialReason::InvalidCode,
                message: "Invalid link code".into(),
            };
            self.deny(None, code, &denial, origin).await?;
            return Ok(AccessRequestOutcome::Denied {
                reason: denial.reason,
                message: denial.message,
                link: None,
            });
        };

        if let Err(denial) = evaluate(&link, Utc::now(), self.config.cooldown()) {
            self.deny(Some(&link), code, &denial, origin).await?;
            return Ok(AccessRequestOutcome::Denied {
                reason: denial.reason,
                message: denial.message,
                link: Some(link),
            });
        }

        self.grant(link, origin).await
    }

    /// Consume a use and actuate the gate.
    ///
    /// Call only after an allowing [`evaluate`]; the store-level conditional
    /// update re-checks every constraint atomically, so a race that slipped
    /// past validation still resolves to a denial here. Counter and audit
    /// writes are durable before the actuator is invoked; an actuation
    /// failure is reported as a distinct `Error` attempt and the consumed use
    /// is kept.
    pub async fn grant(
        &self,
        link: AccessLink,
        origin: &RequestOrigin,
    ) -> Result<AccessRequestOutcome> {
        let now = Utc::now();
        let outcome = self
            .store
            .try_consume_use(link.id, now, self.config.cooldown())
            .await?;

        let updated = match outcome {
            ConsumeOutcome::Consumed {
                link: updated,
                became_exhausted,
            } => {
                if became_exhausted {
                    tracing::info!(
                        target: "access_decision",
                        link_id = %updated.id,
                        code = %updated.code,
                        granted_count = updated.granted_count,
                        "Link exhausted by this grant"
                    );
                    self.record_audit(AuditRecordInput {
                        action: AuditAction::StatusRecalculated,
                        link_id: updated.id,
                        link_code: Some(updated.code.clone()),
                        link_name: Some(updated.name.clone()),
                        actor: Actor::system(),
                        origin: origin.clone(),
                        changes: Some(
                            [(
                                "status".to_string(),
                                field_change(LinkStatus::Active, updated.status),
                            )]
                            .into(),
                        ),
                        context: Some(serde_json::json!({
                            "granted_count": updated.granted_count,
                            "max_uses": updated.max_uses,
                        })),
                    })
                    .await;
                }
                updated
            }
            ConsumeOutcome::CoolingDown { retry_after_secs } => {
                let denial = Denial {
                    reason: DenialReason::Cooldown,
                    message: format!(
                        "Please wait {retry_after_secs} seconds before requesting access again"
                    ),
                };
                self.deny(Some(&link), &link.code, &denial, origin).await?;
                return Ok(AccessRequestOutcome::Denied {
                    reason: denial.reason,
                    message: denial.message,
                    link: Some(link),
                });
            }
            ConsumeOutcome::Exhausted => {
                let denial = denial_for_status(
                    LinkStatus::Inactive(InactiveReason::Exhausted),
                    &link,
                );
                self.deny(Some(&link), &link.code, &denial, origin).await?;
                return Ok(AccessRequestOutcome::Denied {
                    reason: denial.reason,
                    message: denial.message,
                    link: Some(link),
                });
            }
            ConsumeOutcome::NotUsable { status } => {
                let denial = denial_for_status(status, &link);
                self.deny(Some(&link), &link.code, &denial, origin).await?;
                return Ok(AccessRequestOutcome::Denied {
                    reason: denial.reason,
                    message: denial.message,
                    link: Some(link),
                });
            }
        };

        match self.actuator.open().await {
            Ok(latency) => {
                let actuation_ms = latency.as_millis() as i64;
                self.attempts
                    .append(AccessAttemptInput {
                        link_id: Some(updated.id),
                        code_used: updated.code.clone(),
                        outcome: AttemptOutcome::Granted,
                        denial_reason: None,
                        error_message: None,
                        actuation_ms: Some(actuation_ms),
                        origin: origin.clone(),
                    })
                    .await?;

                tracing::info!(
                    target: "access_decision",
                    link_id = %updated.id,
                    code = %updated.code,
                    name = %updated.name,
                    actuation_ms,
                    "Access granted"
                );

                Ok(AccessRequestOutcome::Granted {
                    link: updated,
                    actuation_ms: actuation_ms as u64,
                })
            }
            Err(err) => {
                tracing::error!(
                    target: "access_decision",
                    link_id = %updated.id,
                    code = %updated.code,
                    error = %err,
                    "Gate actuation failed after admission; use already consumed"
                );

                self.attempts
                    .append(AccessAttemptInput {
                        link_id: Some(updated.id),
                        code_used: updated.code.clone(),
                        outcome: AttemptOutcome::Error,
                        denial_reason: None,
                        error_message: Some(err.to_string()),
                        actuation_ms: None,
                        origin: origin.clone(),
                    })
                    .await?;

                Ok(AccessRequestOutcome::DeviceUnavailable {
                    link: updated,
                    message: DEVICE_UNAVAILABLE_MESSAGE.into(),
                })
            }
        }
    }

    /// Record a refusal: bump the denial counter when the link is known and
    /// always append an attempt record, even for unresolved codes.
    pub async fn deny(
        &self,
        link: Option<&AccessLink>,
        code_used: &str,
        denial: &Denial,
        origin: &RequestOrigin,
    ) -> Result<AccessAttempt> {
        if let Some(link) = link {
            self.store.record_denial(link.id, Utc::now()).await?;
        }

        let attempt = self
            .attempts
            .append(AccessAttemptInput {
                link_id: link.map(|l| l.id),
                code_used: code_used.to_string(),
                outcome: AttemptOutcome::Denied,
                denial_reason: Some(denial.reason),
                error_message: None,
                actuation_ms: None,
                origin: origin.clone(),
            })
            .await?;

        tracing::info!(
            target: "access_decision",
            code = %code_used,
            reason = %denial.reason,
            ip = origin.ip_address.as_deref().unwrap_or("unknown"),
            "Access denied"
        );

        Ok(attempt)
    }

    /// Append an audit record, logging loudly on failure.
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
