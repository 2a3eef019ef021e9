//! Gate actuation client.
//!
//! Performs the external gate-open call over HTTP with bounded retries and
//! capped exponential backoff. Admission decisions never pass through this
//! crate; by the time [`Actuator::open`] is invoked the caller has already
//! committed its bookkeeping, so a failure here is reported as a distinct
//! outcome rather than rolled back.

pub mod client;
pub mod error;
pub mod retry;

pub use client::{Actuator, ActuatorClient, ActuatorConfig};
pub use error::ActuationError;
pub use retry::{RetryPolicy, RetrySchedule};
