//! SQLite-backed audit repository
//!
//! Timestamps are stored as INTEGER microseconds. Every statement is a single
//! autocommit write, so with WAL and `synchronous = FULL` an insert is durable
//! once it returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::domain::audit::{
    AuditCategory, AuditEvent, AuditFilter, AuditRepository, EventCursor, LedgerError, Resolution,
    Severity,
};

const SELECT_COLUMNS: &str = r#"
    SELECT sequence, id, timestamp, category, severity, subject_impact, detail,
           resolution, resolved_at, resolution_detail, retention_until
    FROM audit_events
"#;

fn unavailable(e: sqlx::Error) -> LedgerError {
    LedgerError::Unavailable(e.to_string())
}

fn from_micros(micros: i64, column: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| LedgerError::Corrupt(format!("{} out of range: {}", column, micros)))
}

fn parse_json(raw: &str, column: &str) -> Result<serde_json::Value, LedgerError> {
    serde_json::from_str(raw).map_err(|e| LedgerError::Corrupt(format!("Invalid {}: {}", column, e)))
}

/// Repository for audit events stored in SQLite
#[derive(Debug, Clone)]
pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn insert(&self, mut event: AuditEvent) -> Result<AuditEvent, LedgerError> {
        let detail = event.detail.to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO audit_events (id, timestamp, category, severity, subject_impact, detail, resolution, retention_until)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.timestamp.timestamp_micros())
        .bind(event.category.as_str())
        .bind(event.severity.as_str())
        .bind(event.subject_impact)
        .bind(&detail)
        .bind(event.resolution.as_str())
        .bind(event.retention_until.timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        event.sequence = result.last_insert_rowid();
        Ok(event)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AuditEvent>, LedgerError> {
        let row: Option<AuditEventRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        row.map(AuditEventRow::into_event).transpose()
    }

    async fn mark_resolved(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
        detail: &serde_json::Value,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE audit_events
            SET resolution = 'resolved', resolved_at = ?, resolution_detail = ?
            WHERE id = ? AND resolution = 'open'
            "#,
        )
        .bind(resolved_at.timestamp_micros())
        .bind(detail.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM audit_events WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_page(
        &self,
        filter: &AuditFilter,
        after: Option<EventCursor>,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, LedgerError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        query.push(" WHERE 1 = 1");

        if let Some(from) = filter.from {
            query.push(" AND timestamp >= ").push_bind(from.timestamp_micros());
        }
        if let Some(until) = filter.until {
            query.push(" AND timestamp < ").push_bind(until.timestamp_micros());
        }
        if let Some(severity) = filter.severity {
            query.push(" AND severity = ").push_bind(severity.as_str());
        }
        if let Some(category) = filter.category {
            query.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(cursor) = after {
            let ts = cursor.timestamp.timestamp_micros();
            query
                .push(" AND (timestamp > ")
                .push_bind(ts)
                .push(" OR (timestamp = ")
                .push_bind(ts)
                .push(" AND sequence > ")
                .push_bind(cursor.sequence)
                .push("))");
        }

        query
            .push(" ORDER BY timestamp ASC, sequence ASC LIMIT ")
            .push_bind(i64::from(limit));

        let rows: Vec<AuditEventRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        rows.into_iter().map(AuditEventRow::into_event).collect()
    }

    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM audit_events")
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;

        latest.map(|micros| from_micros(micros, "timestamp")).transpose()
    }
}

#[derive(Debug, FromRow)]
struct AuditEventRow {
    sequence: i64,
    id: String,
    timestamp: i64,
    category: String,
    severity: String,
    subject_impact: bool,
    detail: String,
    resolution: String,
    resolved_at: Option<i64>,
    resolution_detail: Option<String>,
    retention_until: i64,
}

impl AuditEventRow {
    fn into_event(self) -> Result<AuditEvent, LedgerError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| LedgerError::Corrupt(format!("Invalid event id {}: {}", self.id, e)))?;
        let category = AuditCategory::parse(&self.category)
            .ok_or_else(|| LedgerError::Corrupt(format!("Unknown category: {}", self.category)))?;
        let severity = Severity::parse(&self.severity)
            .ok_or_else(|| LedgerError::Corrupt(format!("Unknown severity: {}", self.severity)))?;
        let resolution = Resolution::parse(&self.resolution).ok_or_else(|| {
            LedgerError::Corrupt(format!("Unknown resolution: {}", self.resolution))
        })?;

        Ok(AuditEvent {
            id,
            sequence: self.sequence,
            timestamp: from_micros(self.timestamp, "timestamp")?,
            category,
            severity,
            subject_impact: self.subject_impact,
            detail: parse_json(&self.detail, "detail")?,
            resolution,
            resolved_at: self
                .resolved_at
                .map(|micros| from_micros(micros, "resolved_at"))
                .transpose()?,
            resolution_detail: self
                .resolution_detail
                .as_deref()
                .map(|raw| parse_json(raw, "resolution_detail"))
                .transpose()?,
            retention_until: from_micros(self.retention_until, "retention_until")?,
        })
    }
}
