//! Database migrations
//!
//! This module manages SQLite schema migrations for the ledger.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Audit ledger
///
/// Timestamps are INTEGER microseconds since the Unix epoch so that they sort
/// numerically. The triggers make the append-only rules hold even for
/// writers that bypass the ledger.
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_events (
        sequence INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        timestamp INTEGER NOT NULL,
        category TEXT NOT NULL CHECK (category IN ('encryption', 'decryption', 'validation', 'key_rotation', 'access')),
        severity TEXT NOT NULL CHECK (severity IN ('low', 'medium', 'high', 'critical')),
        subject_impact INTEGER NOT NULL CHECK (subject_impact IN (0, 1)),
        detail TEXT NOT NULL,
        resolution TEXT NOT NULL DEFAULT 'open' CHECK (resolution IN ('open', 'resolved')),
        resolved_at INTEGER,
        resolution_detail TEXT,
        retention_until INTEGER NOT NULL,
        CHECK (retention_until > timestamp),
        CHECK ((resolution = 'open') = (resolved_at IS NULL))
    );

    CREATE INDEX IF NOT EXISTS idx_audit_events_order ON audit_events(timestamp, sequence);
    CREATE INDEX IF NOT EXISTS idx_audit_events_category ON audit_events(category);
    CREATE INDEX IF NOT EXISTS idx_audit_events_severity ON audit_events(severity);

    CREATE TRIGGER IF NOT EXISTS audit_events_immutable
    BEFORE UPDATE OF sequence, id, timestamp, category, severity, subject_impact, detail, retention_until
    ON audit_events
    BEGIN
        SELECT RAISE(ABORT, 'audit event fields are immutable');
    END;

    CREATE TRIGGER IF NOT EXISTS audit_events_forward_only
    BEFORE UPDATE OF resolution, resolved_at, resolution_detail
    ON audit_events
    WHEN OLD.resolution = 'resolved'
    BEGIN
        SELECT RAISE(ABORT, 'resolved audit events cannot change');
    END;
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    // Get the latest version
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version > CURRENT_VERSION {
        anyhow::bail!(
            "Ledger schema version {} is newer than this build supports ({})",
            current_version,
            CURRENT_VERSION
        );
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Audit ledger");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    async fn insert_sample(pool: &SqlitePool, id: &str) {
        sqlx::query(
            r#"
            INSERT INTO audit_events (id, timestamp, category, severity, subject_impact, detail, retention_until)
            VALUES (?, 1000, 'access', 'low', 0, '{}', 2000)
            "#,
        )
        .bind(id)
        .execute(pool)
        .await
        .expect("Failed to insert sample event");
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        // Should start with no migrations
        assert_eq!(get_current_version(&pool).await.unwrap(), 0);

        run_migrations(&pool).await.unwrap();
        assert_eq!(get_current_version(&pool).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        // Run migrations twice
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        // Should still be at current version
        assert_eq!(get_current_version(&pool).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_immutable_columns_rejected() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();
        insert_sample(&pool, "evt-1").await;

        for statement in [
            "UPDATE audit_events SET severity = 'critical' WHERE id = 'evt-1'",
            "UPDATE audit_events SET retention_until = 1001 WHERE id = 'evt-1'",
            "UPDATE audit_events SET detail = '{\"x\":1}' WHERE id = 'evt-1'",
        ] {
            assert!(
                sqlx::query(statement).execute(&pool).await.is_err(),
                "{} should be rejected",
                statement
            );
        }
    }

    #[tokio::test]
    async fn test_resolution_cannot_go_backward() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();
        insert_sample(&pool, "evt-1").await;

        sqlx::query(
            "UPDATE audit_events SET resolution = 'resolved', resolved_at = 1500, resolution_detail = '{}' WHERE id = 'evt-1'",
        )
        .execute(&pool)
        .await
        .expect("Open -> Resolved should be allowed");

        let reopen = sqlx::query(
            "UPDATE audit_events SET resolution = 'open', resolved_at = NULL WHERE id = 'evt-1'",
        )
        .execute(&pool)
        .await;
        assert!(reopen.is_err());
    }

    #[tokio::test]
    async fn test_check_constraints() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let bad_category = sqlx::query(
            "INSERT INTO audit_events (id, timestamp, category, severity, subject_impact, detail, retention_until) VALUES ('x', 1, 'billing', 'low', 0, '{}', 2)",
        )
        .execute(&pool)
        .await;
        assert!(bad_category.is_err());

        let retention_before_timestamp = sqlx::query(
            "INSERT INTO audit_events (id, timestamp, category, severity, subject_impact, detail, retention_until) VALUES ('y', 5, 'access', 'low', 0, '{}', 4)",
        )
        .execute(&pool)
        .await;
        assert!(retention_before_timestamp.is_err());
    }
}
