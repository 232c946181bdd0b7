//! In-memory audit repository
//!
//! Not durable. Used in tests and for ephemeral deployments. The availability
//! switches simulate a store outage.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::audit::{
    AuditEvent, AuditFilter, AuditRepository, EventCursor, LedgerError, Resolution,
};

#[derive(Debug, Default)]
struct State {
    events: Vec<AuditEvent>,
    next_sequence: i64,
}

#[derive(Debug, Clone)]
pub struct InMemoryAuditRepository {
    state: Arc<Mutex<State>>,
    available: Arc<AtomicBool>,
    failing_inserts: Arc<AtomicUsize>,
}

impl Default for InMemoryAuditRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            available: Arc::new(AtomicBool::new(true)),
            failing_inserts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Toggle a simulated outage affecting every operation
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `count` inserts fail as unavailable
    pub fn fail_next_inserts(&self, count: usize) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored event in insertion order
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_available(&self) -> Result<(), LedgerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable(
                "in-memory store is offline".to_string(),
            ))
        }
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn insert(&self, mut event: AuditEvent) -> Result<AuditEvent, LedgerError> {
        self.ensure_available()?;
        let injected = self
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(LedgerError::Unavailable(
                "in-memory store rejected the write".to_string(),
            ));
        }

        let mut state = self.lock();
        state.next_sequence += 1;
        event.sequence = state.next_sequence;
        state.events.push(event.clone());
        Ok(event)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AuditEvent>, LedgerError> {
        self.ensure_available()?;
        Ok(self.lock().events.iter().find(|e| e.id == id).cloned())
    }

    async fn mark_resolved(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
        detail: &serde_json::Value,
    ) -> Result<bool, LedgerError> {
        self.ensure_available()?;
        let mut state = self.lock();
        match state
            .events
            .iter_mut()
            .find(|e| e.id == id && e.resolution == Resolution::Open)
        {
            Some(event) => {
                event.resolution = Resolution::Resolved;
                event.resolved_at = Some(resolved_at);
                event.resolution_detail = Some(detail.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, LedgerError> {
        self.ensure_available()?;
        let mut state = self.lock();
        let before = state.events.len();
        state.events.retain(|e| e.id != id);
        Ok(state.events.len() < before)
    }

    async fn fetch_page(
        &self,
        filter: &AuditFilter,
        after: Option<EventCursor>,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, LedgerError> {
        self.ensure_available()?;
        let state = self.lock();
        let mut page: Vec<AuditEvent> = state
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .filter(|e| after.is_none_or(|cursor| cursor.precedes(e)))
            .cloned()
            .collect();
        page.sort_by(|a, b| (a.timestamp, a.sequence).cmp(&(b.timestamp, b.sequence)));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, LedgerError> {
        self.ensure_available()?;
        Ok(self.lock().events.iter().map(|e| e.timestamp).max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::{AuditCategory, AuditEventDraft, Severity};

    fn event() -> AuditEvent {
        let now = Utc::now();
        AuditEvent::from_draft(
            AuditEventDraft::new(AuditCategory::Access, Severity::Low),
            now,
            now + chrono::Duration::days(1),
        )
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_sequence() {
        let repo = InMemoryAuditRepository::new();
        let a = repo.insert(event()).await.unwrap();
        let b = repo.insert(event()).await.unwrap();
        assert!(b.sequence > a.sequence);
    }

    #[tokio::test]
    async fn test_mark_resolved_only_from_open() {
        let repo = InMemoryAuditRepository::new();
        let stored = repo.insert(event()).await.unwrap();
        let detail = serde_json::json!({"by": "ops"});
        assert!(repo.mark_resolved(stored.id, Utc::now(), &detail).await.unwrap());
        assert!(!repo.mark_resolved(stored.id, Utc::now(), &detail).await.unwrap());
        assert!(!repo.mark_resolved(Uuid::new_v4(), Utc::now(), &detail).await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_failures_then_recovery() {
        let repo = InMemoryAuditRepository::new();
        repo.fail_next_inserts(2);
        assert!(repo.insert(event()).await.is_err());
        assert!(repo.insert(event()).await.is_err());
        assert!(repo.insert(event()).await.is_ok());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_store_rejects_everything() {
        let repo = InMemoryAuditRepository::new();
        repo.set_available(false);
        assert!(matches!(
            repo.insert(event()).await,
            Err(LedgerError::Unavailable(_))
        ));
        assert!(matches!(
            repo.fetch_page(&AuditFilter::new(), None, 10).await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
