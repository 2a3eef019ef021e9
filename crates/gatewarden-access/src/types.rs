//! Type definitions for the access-link domain.
//!
//! Includes newtype wrappers for IDs and enums for statuses, denial reasons
//! and attempt outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types (Newtype Pattern)
// ============================================================================

macro_rules! uuid_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Get the inner UUID.
            #[must_use]
            pub fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_newtype!(
    /// Unique identifier for an access link.
    LinkId
);

uuid_newtype!(
    /// Unique identifier for an audit record.
    AuditRecordId
);

uuid_newtype!(
    /// Unique identifier for an access attempt record.
    AttemptId
);

// ============================================================================
// Status
// ============================================================================

/// Why a link is currently inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveReason {
    /// Current time is before the link's activation time.
    NotYetActive,
    /// Current time is past the link's expiration.
    Expired,
    /// The grant counter reached the configured maximum.
    Exhausted,
}

impl InactiveReason {
    /// Stable string form used in persistence and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotYetActive => "not_yet_active",
            Self::Expired => "expired",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical status of an access link.
///
/// `Disabled` is a manual override the status calculator never overwrites,
/// and `Deleted` is terminal: a deleted link never transitions again. Both
/// are first-class variants rather than side-channel booleans so invalid
/// combinations (a deleted-but-active link) cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// The link can grant access.
    Active,
    /// The link is temporarily unusable for the given reason.
    Inactive(InactiveReason),
    /// Manually disabled by an operator; reversible via enable.
    Disabled,
    /// Soft-deleted; permanently frozen.
    Deleted,
}

impl LinkStatus {
    /// Check if the link can currently grant access.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if the link is in its terminal deleted state.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Check if the link is manually disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Stable string form of the status kind, without the inactive reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive(_) => "inactive",
            Self::Disabled => "disabled",
            Self::Deleted => "deleted",
        }
    }

    /// The inactive reason, when there is one.
    #[must_use]
    pub fn inactive_reason(&self) -> Option<InactiveReason> {
        match self {
            Self::Inactive(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive(reason) => write!(f, "inactive ({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}

// ============================================================================
// Purpose
// ============================================================================

/// Purpose categories for access links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkPurpose {
    Delivery,
    RecurringDelivery,
    Visitor,
    Service,
    Emergency,
    #[default]
    Other,
}

impl LinkPurpose {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivery => "delivery",
            Self::RecurringDelivery => "recurring_delivery",
            Self::Visitor => "visitor",
            Self::Service => "service",
            Self::Emergency => "emergency",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for LinkPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Decisions and attempts
// ============================================================================

/// Why an access attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// No link matches the presented code.
    InvalidCode,
    /// The link was soft-deleted.
    Deleted,
    /// The link is manually disabled.
    Disabled,
    /// A previous grant is still within the cooldown window.
    Cooldown,
    /// The link's activation time is in the future.
    NotYetActive,
    /// The link's expiration has passed.
    Expired,
    /// The grant counter reached the configured maximum.
    Exhausted,
    /// Catch-all for denials that fit no specific category.
    Other,
}

impl DenialReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCode => "invalid_code",
            Self::Deleted => "deleted",
            Self::Disabled => "disabled",
            Self::Cooldown => "cooldown",
            Self::NotYetActive => "not_yet_active",
            Self::Expired => "expired",
            Self::Exhausted => "exhausted",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InactiveReason> for DenialReason {
    fn from(reason: InactiveReason) -> Self {
        match reason {
            InactiveReason::NotYetActive => Self::NotYetActive,
            InactiveReason::Expired => Self::Expired,
            InactiveReason::Exhausted => Self::Exhausted,
        }
    }
}

/// Outcome of a recorded access attempt.
///
/// `Error` marks an attempt where admission succeeded but the gate hardware
/// could not be actuated; it is deliberately distinct from `Denied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Granted,
    Denied,
    Error,
}

impl AttemptOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Request context
// ============================================================================

/// Opaque acting identity supplied by the boundary layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Opaque subject identifier from the authentication layer.
    pub id: String,
    /// Display name, when the boundary layer knows one.
    pub name: Option<String>,
}

impl Actor {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Actor used for transitions the system performs on its own, such as
    /// reconciliation sweeps and counter-triggered status flips.
    #[must_use]
    pub fn system() -> Self {
        Self::new("system")
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::system()
    }
}

/// Request-origin metadata captured per mutating call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
