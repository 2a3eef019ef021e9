//! PostgreSQL persistence for the gatewarden access core.
//!
//! Provides row models with runtime-checked queries, a pool constructor, and
//! `Pg*Store` adapters implementing the storage traits from
//! `gatewarden-access`.
//!
//! Logical shape: `access_links` keyed by id with a unique index on `code`;
//! `audit_records` and `access_attempts` are append-only, indexed by link id
//! and timestamp. Schema management itself lives outside this crate.

pub mod error;
pub mod models;
pub mod pool;
pub mod store;

pub use error::DbError;
pub use pool::create_pool;
pub use store::{PgAttemptStore, PgAuditStore, PgLinkStore};
