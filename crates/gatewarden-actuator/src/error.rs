//! Error types for gate actuation.

use thiserror::Error;

/// Actuation failure variants.
///
/// `Timeout`, `Connect` and `Status` describe a single failed attempt and are
/// considered transient; `RetriesExhausted` is the terminal failure raised
/// once the retry budget is spent, carrying the last attempt's error.
#[derive(Debug, Error)]
pub enum ActuationError {
    /// The actuator did not respond within the per-attempt timeout.
    #[error("actuator timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The actuator endpoint could not be reached.
    #[error("failed to reach actuator: {0}")]
    Connect(String),

    /// The actuator responded with a non-success status code.
    #[error("actuator returned status {0}")]
    Status(u16),

    /// The HTTP client could not be constructed from the given configuration.
    #[error("invalid actuator configuration: {0}")]
    InvalidConfig(String),

    /// All attempts failed; `last` is the error from the final attempt.
    #[error("actuation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ActuationError>,
    },
}

impl ActuationError {
    /// Check if this error is the terminal retries-exhausted failure.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ActuationError::RetriesExhausted { .. })
    }

    /// Check if this error describes a per-attempt timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ActuationError::Timeout { .. })
    }
}
