//! Audit ledger repository traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::entity::{AuditEvent, AuditFilter, EventCursor, LedgerError};

/// Durable storage for audit events
///
/// Implementations must make each write atomic and durable before returning,
/// and report any store failure as [`LedgerError::Unavailable`].
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persist a new event, returning it with its assigned `sequence`
    async fn insert(&self, event: AuditEvent) -> Result<AuditEvent, LedgerError>;

    async fn get(&self, id: Uuid) -> Result<Option<AuditEvent>, LedgerError>;

    /// Resolve an event if and only if it is still Open.
    /// Returns `false` when the event is absent or already resolved.
    async fn mark_resolved(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
        detail: &serde_json::Value,
    ) -> Result<bool, LedgerError>;

    /// Remove an event. Retention is enforced by the ledger, not here.
    async fn delete(&self, id: Uuid) -> Result<bool, LedgerError>;

    /// Up to `limit` matching events after `after`, ordered by (timestamp, sequence)
    async fn fetch_page(
        &self,
        filter: &AuditFilter,
        after: Option<EventCursor>,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, LedgerError>;

    /// Timestamp of the newest stored event, if any
    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, LedgerError>;
}
