//! Error types for the access-link core.
//!
//! Policy denials are not errors: a refused access attempt is a first-class
//! decision outcome carried by the decision engine's return types. This enum
//! covers genuine failures only.

use thiserror::Error;

/// Access-core error variants.
#[derive(Debug, Error)]
pub enum AccessError {
    /// No link exists for the given identifier.
    #[error("access link not found")]
    NotFound,

    /// Input was rejected before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A custom access code collides with a live link.
    #[error("access code already in use")]
    DuplicateCode,

    /// Code generation could not produce a unique code within its budget.
    #[error("failed to generate a unique access code after {0} attempts")]
    CodeGeneration(u32),

    /// The operation targets a soft-deleted link, which is terminal.
    #[error("access link has been deleted")]
    LinkDeleted,

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AccessError {
    /// Wrap a backend error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(err))
    }

    /// Check if this error indicates a missing link.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, AccessError::NotFound)
    }

    /// Check if this error was rejected pre-mutation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AccessError::Validation(_) | AccessError::DuplicateCode
        )
    }

    /// Check if this error indicates the target link is deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, AccessError::LinkDeleted)
    }
}

/// Result alias for access-core operations.
pub type Result<T> = std::result::Result<T, AccessError>;
