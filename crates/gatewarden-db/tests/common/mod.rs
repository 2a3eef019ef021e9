//! Shared helpers for gatewarden-db integration tests.
//!
//! These require a running PostgreSQL reachable through `DATABASE_URL` and
//! run only with `--features integration`.

#![allow(dead_code)]

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS access_links (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        notes TEXT,
        purpose TEXT NOT NULL,
        code TEXT NOT NULL,
        status TEXT NOT NULL,
        inactive_reason TEXT,
        active_on TIMESTAMPTZ,
        expiration TIMESTAMPTZ,
        max_uses BIGINT,
        granted_count BIGINT NOT NULL DEFAULT 0,
        denied_count BIGINT NOT NULL DEFAULT 0,
        last_granted_at TIMESTAMPTZ,
        deleted_at TIMESTAMPTZ,
        auto_open BOOLEAN NOT NULL DEFAULT FALSE,
        owner_id TEXT NOT NULL,
        owner_name TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uq_access_links_code
    ON access_links (code) WHERE status <> 'deleted'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_records (
        id UUID PRIMARY KEY,
        action TEXT NOT NULL,
        link_id UUID NOT NULL,
        link_code TEXT,
        link_name TEXT,
        actor_id TEXT NOT NULL,
        actor_name TEXT,
        ip_address TEXT,
        user_agent TEXT,
        changes JSONB,
        context JSONB,
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ix_audit_records_link
    ON audit_records (link_id, occurred_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS access_attempts (
        id UUID PRIMARY KEY,
        link_id UUID,
        code_used TEXT NOT NULL,
        outcome TEXT NOT NULL,
        denial_reason TEXT,
        error_message TEXT,
        actuation_ms BIGINT,
        ip_address TEXT,
        user_agent TEXT,
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ix_access_attempts_link
    ON access_attempts (link_id, occurred_at)
    "#,
];

/// Connect and make sure the logical schema exists.
pub async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for integration tests");
    let pool = gatewarden_db::create_pool(&url, 5)
        .await
        .expect("failed to connect to test database");
    setup_schema(&pool).await;
    pool
}

/// A single-connection pool, for session-scoped behavior like advisory locks.
pub async fn single_connection_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for integration tests");
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .expect("failed to connect to test database")
}

pub async fn setup_schema(pool: &PgPool) {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .expect("failed to apply test schema");
    }
}

/// A code unique to this test run, so reruns never collide.
pub fn unique_code(prefix: &str) -> String {
    format!("{prefix}-{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}
