//! Connection pool construction.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

/// Create a connection pool for the given database URL.
///
/// # Errors
///
/// Returns [`DbError::ConnectionFailed`] if the pool cannot be established.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(DbError::ConnectionFailed)?;

    tracing::info!(max_connections, "Database pool established");
    Ok(pool)
}
