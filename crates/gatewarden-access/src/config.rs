//! Configuration for the access core.
//!
//! Injected into services rather than read from ambient global state, so the
//! engine stays unit-testable in isolation.

/// Tunables for link creation and admission control.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Minimum interval between successive grants per link, in seconds.
    /// Zero disables the cooldown check.
    pub cooldown_secs: u64,

    /// Length of generated access codes.
    pub code_length: usize,

    /// How many collision retries code generation may spend.
    pub code_generation_attempts: u32,

    /// Expiration applied to new links that specify none, in hours.
    /// `None` leaves such links unbounded.
    pub default_expiration_hours: Option<i64>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30,
            code_length: 8,
            code_generation_attempts: 10,
            default_expiration_hours: Some(24),
        }
    }
}

impl AccessConfig {
    /// The cooldown window as a chrono duration, `None` when disabled.
    #[must_use]
    pub fn cooldown(&self) -> Option<chrono::Duration> {
        if self.cooldown_secs == 0 {
            None
        } else {
            Some(chrono::Duration::seconds(self.cooldown_secs as i64))
        }
    }
}
