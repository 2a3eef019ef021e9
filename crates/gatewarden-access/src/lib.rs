//! Access-link lifecycle and decision core.
//!
//! This crate provides the domain logic for shareable gate-access links:
//! time-window and usage-bounded codes that open a physical gate through an
//! external actuator, with an immutable audit trail.
//!
//! # Services
//!
//! - [`link::LinkService`]: operator lifecycle. Create, edit, disable,
//!   enable, soft delete, code regeneration.
//! - [`decision::AccessService`]: runtime admission. Validate a code, grant
//!   (race-free use consumption + gate actuation) or deny with a specific
//!   reason.
//! - [`reconciler::Reconciler`]: periodic sweep persisting purely temporal
//!   status transitions.
//!
//! # Status derivation
//!
//! [`status::calculate`] is the single source of truth for a link's status;
//! the persisted column only caches its last result. Manual disable and soft
//! delete are first-class [`types::LinkStatus`] variants the calculator
//! respects unconditionally.
//!
//! # Storage
//!
//! Persistence sits behind the [`link::LinkStore`], [`audit::AuditStore`] and
//! [`decision::AttemptStore`] traits, each with an in-memory implementation
//! for tests. Production backends implement these traits elsewhere.

pub mod audit;
pub mod config;
pub mod decision;
pub mod error;
pub mod link;
pub mod reconciler;
pub mod status;
pub mod types;

// Re-export commonly used types
pub use audit::{
    field_change, AuditAction, AuditRecord, AuditRecordInput, AuditStore, FieldChange,
    InMemoryAuditStore,
};
pub use config::AccessConfig;
pub use decision::{
    evaluate, AccessAttempt, AccessAttemptInput, AccessRequestOutcome, AccessService,
    AttemptStore, Decision, Denial, InMemoryAttemptStore,
};
pub use error::{AccessError, Result};
pub use link::{
    AccessLink, ConsumeOutcome, CreateLinkInput, InMemoryLinkStore, LinkFilter, LinkService,
    LinkStore, UpdateLinkInput,
};
pub use reconciler::{Reconciler, ReconcilerConfig, SweepStats};
pub use types::{
    Actor, AttemptId, AttemptOutcome, AuditRecordId, DenialReason, InactiveReason, LinkId,
    LinkPurpose, LinkStatus, RequestOrigin,
};
