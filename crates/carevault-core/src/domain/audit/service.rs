//! Audit ledger service

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_stream::try_stream;
use chrono::{DateTime, Months, SubsecRound, Utc};
use futures_core::Stream;
use futures_util::TryStreamExt;
use uuid::Uuid;

use super::{
    clock::{Clock, SystemClock},
    entity::{
        AuditEvent, AuditEventDraft, AuditFilter, EventCursor, LedgerError, Resolution,
    },
    repository::AuditRepository,
};

/// Retention floor; configured values below this are raised to it
pub const MIN_RETENTION_YEARS: u32 = 7;

/// Default number of events fetched per query page
pub const DEFAULT_PAGE_SIZE: u32 = 256;

/// A lazy stream of events in (timestamp, sequence) order
pub type EventStream = Pin<Box<dyn Stream<Item = Result<AuditEvent, LedgerError>> + Send>>;

/// Append-only, retention-enforced audit ledger
///
/// Timestamps are truncated to microseconds and never go backwards within one
/// ledger, so events appended in sequence by one caller are read back in the
/// same order.
pub struct AuditLedger {
    repository: Arc<dyn AuditRepository>,
    clock: Arc<dyn Clock>,
    retention_years: u32,
    page_size: u32,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl AuditLedger {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self {
            repository,
            clock: Arc::new(SystemClock),
            retention_years: MIN_RETENTION_YEARS,
            page_size: DEFAULT_PAGE_SIZE,
            last_stamp: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the retention period; values below seven years are raised to seven
    pub fn with_retention_years(mut self, years: u32) -> Self {
        if years < MIN_RETENTION_YEARS {
            tracing::warn!(
                requested = years,
                minimum = MIN_RETENTION_YEARS,
                "Audit retention below the minimum, using the minimum"
            );
        }
        self.retention_years = years.max(MIN_RETENTION_YEARS);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn retention_years(&self) -> u32 {
        self.retention_years
    }

    /// Continue the timestamp sequence of an existing store
    ///
    /// Call once after opening a ledger over persisted events, so a wall clock
    /// that moved backwards across a restart cannot stamp new events before
    /// old ones.
    pub async fn resume(&self) -> Result<(), LedgerError> {
        let Some(latest) = self.repository.latest_timestamp().await? else {
            return Ok(());
        };
        let mut last = self.last_stamp.lock().unwrap_or_else(|e| e.into_inner());
        if last.is_none_or(|current| current < latest) {
            *last = Some(latest);
        }
        tracing::debug!(latest = %latest, "Resumed audit ledger");
        Ok(())
    }

    fn stamp(&self) -> DateTime<Utc> {
        let now = self.clock.now().trunc_subsecs(6);
        let mut last = self.last_stamp.lock().unwrap_or_else(|e| e.into_inner());
        let stamped = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last = Some(stamped);
        stamped
    }

    fn retention_for(&self, timestamp: DateTime<Utc>) -> Result<DateTime<Utc>, LedgerError> {
        timestamp
            .checked_add_months(Months::new(self.retention_years * 12))
            .ok_or_else(|| {
                LedgerError::Corrupt(format!("Retention end out of range for {}", timestamp))
            })
    }

    /// Stamp, persist, and return a new Open event
    ///
    /// The durable write runs as its own task: once issued it completes even
    /// if the caller stops waiting. Store failures are `Unavailable`.
    pub async fn append(&self, draft: AuditEventDraft) -> Result<AuditEvent, LedgerError> {
        let timestamp = self.stamp();
        let retention_until = self.retention_for(timestamp)?;
        let event = AuditEvent::from_draft(draft, timestamp, retention_until);

        let repository = Arc::clone(&self.repository);
        let event = tokio::spawn(async move { repository.insert(event).await })
            .await
            .map_err(|e| LedgerError::Unavailable(format!("Audit write task failed: {}", e)))??;

        tracing::debug!(
            event_id = %event.id,
            sequence = event.sequence,
            category = %event.category,
            severity = %event.severity,
            "Appended audit event"
        );
        Ok(event)
    }

    pub async fn get(&self, event_id: Uuid) -> Result<AuditEvent, LedgerError> {
        self.repository
            .get(event_id)
            .await?
            .ok_or(LedgerError::NotFound(event_id))
    }

    /// Move an Open event to Resolved, recording `detail`
    pub async fn resolve(
        &self,
        event_id: Uuid,
        detail: serde_json::Value,
    ) -> Result<AuditEvent, LedgerError> {
        let event = self.get(event_id).await?;
        if !event.resolution.can_transition_to(Resolution::Resolved) {
            return Err(LedgerError::InvalidTransition {
                event_id,
                from: event.resolution,
                to: Resolution::Resolved,
            });
        }

        let resolved_at = self.clock.now().trunc_subsecs(6).max(event.timestamp);
        if !self
            .repository
            .mark_resolved(event_id, resolved_at, &detail)
            .await?
        {
            // Someone else resolved or purged it in between
            return match self.repository.get(event_id).await? {
                Some(current) => Err(LedgerError::InvalidTransition {
                    event_id,
                    from: current.resolution,
                    to: Resolution::Resolved,
                }),
                None => Err(LedgerError::NotFound(event_id)),
            };
        }

        tracing::info!(event_id = %event_id, "Resolved audit event");
        Ok(AuditEvent {
            resolution: Resolution::Resolved,
            resolved_at: Some(resolved_at),
            resolution_detail: Some(detail),
            ..event
        })
    }

    /// Delete an event whose retention period has elapsed
    ///
    /// Administrative path only. Fails with `Retention` while `now < retention_until`.
    pub async fn purge(&self, event_id: Uuid) -> Result<(), LedgerError> {
        let event = self.get(event_id).await?;
        if !event.is_purgeable_at(self.clock.now()) {
            return Err(LedgerError::Retention {
                event_id,
                retention_until: event.retention_until,
            });
        }

        if !self.repository.delete(event_id).await? {
            return Err(LedgerError::NotFound(event_id));
        }

        tracing::warn!(
            event_id = %event_id,
            retention_until = %event.retention_until,
            "Purged audit event past retention"
        );
        Ok(())
    }

    /// Build a restartable query over events matching `filter`
    pub fn query(&self, filter: AuditFilter) -> EventQuery {
        EventQuery {
            repository: Arc::clone(&self.repository),
            filter,
            page_size: self.page_size,
        }
    }
}

/// A restartable audit query
///
/// Each call to [`stream`](Self::stream) starts from the beginning and pages
/// through the store lazily.
#[derive(Clone)]
pub struct EventQuery {
    repository: Arc<dyn AuditRepository>,
    filter: AuditFilter,
    page_size: u32,
}

impl EventQuery {
    pub fn filter(&self) -> &AuditFilter {
        &self.filter
    }

    pub fn stream(&self) -> EventStream {
        let repository = Arc::clone(&self.repository);
        let filter = self.filter.clone();
        let page_size = self.page_size;

        Box::pin(try_stream! {
            let mut cursor: Option<EventCursor> = None;
            loop {
                let page = repository.fetch_page(&filter, cursor, page_size).await?;
                let last_page = (page.len() as u32) < page_size;
                for event in page {
                    cursor = Some(EventCursor::after(&event));
                    yield event;
                }
                if last_page {
                    break;
                }
            }
        })
    }

    /// Drain the whole query into memory
    pub async fn collect(&self) -> Result<Vec<AuditEvent>, LedgerError> {
        self.stream().try_collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::clock::ManualClock;
    use crate::domain::audit::entity::{AuditCategory, Severity};
    use crate::infrastructure::audit::InMemoryAuditRepository;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use futures_util::StreamExt;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    }

    fn ledger_with_clock() -> (AuditLedger, InMemoryAuditRepository, Arc<ManualClock>) {
        let repository = InMemoryAuditRepository::new();
        let clock = Arc::new(ManualClock::new(start()));
        let ledger = AuditLedger::new(Arc::new(repository.clone())).with_clock(clock.clone());
        (ledger, repository, clock)
    }

    fn draft(category: AuditCategory, severity: Severity) -> AuditEventDraft {
        AuditEventDraft::new(category, severity)
    }

    #[tokio::test]
    async fn test_append_stamps_event() {
        let (ledger, repository, _) = ledger_with_clock();
        let event = ledger
            .append(draft(AuditCategory::Encryption, Severity::Low))
            .await
            .unwrap();

        assert_eq!(event.timestamp, start());
        assert_eq!(
            event.retention_until,
            Utc.with_ymd_and_hms(2031, 1, 15, 9, 30, 0).unwrap()
        );
        assert!(event.is_open());
        assert_eq!(repository.len(), 1);
        assert_eq!(ledger.get(event.id).await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_retention_cannot_be_configured_downward() {
        let (ledger, _, _) = ledger_with_clock();
        let ledger = ledger.with_retention_years(1);
        assert_eq!(ledger.retention_years(), MIN_RETENTION_YEARS);

        let event = ledger
            .append(draft(AuditCategory::Access, Severity::Low))
            .await
            .unwrap();
        assert!(event.retention_until >= event.timestamp + Duration::days(365 * 7));
    }

    #[tokio::test]
    async fn test_purge_enforces_retention() {
        let (ledger, repository, clock) = ledger_with_clock();
        let event = ledger
            .append(draft(AuditCategory::Decryption, Severity::Critical))
            .await
            .unwrap();

        clock.advance(Duration::microseconds(1));
        assert!(matches!(
            ledger.purge(event.id).await,
            Err(LedgerError::Retention { event_id, .. }) if event_id == event.id
        ));

        clock.set(event.retention_until - Duration::seconds(1));
        assert!(matches!(
            ledger.purge(event.id).await,
            Err(LedgerError::Retention { .. })
        ));
        assert_eq!(repository.len(), 1);

        clock.set(event.retention_until);
        ledger.purge(event.id).await.unwrap();
        assert!(matches!(
            ledger.get(event.id).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolution_is_forward_only() {
        let (ledger, _, clock) = ledger_with_clock();
        let event = ledger
            .append(draft(AuditCategory::Validation, Severity::Medium))
            .await
            .unwrap();

        clock.advance(Duration::minutes(5));
        let resolved = ledger
            .resolve(event.id, serde_json::json!({"note": "reviewed"}))
            .await
            .unwrap();
        assert_eq!(resolved.resolution, Resolution::Resolved);
        assert_eq!(resolved.resolved_at, Some(start() + Duration::minutes(5)));
        assert_eq!(resolved.retention_until, event.retention_until);
        assert_eq!(ledger.get(event.id).await.unwrap(), resolved);

        assert!(matches!(
            ledger.resolve(event.id, serde_json::json!({})).await,
            Err(LedgerError::InvalidTransition {
                from: Resolution::Resolved,
                to: Resolution::Resolved,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_event_not_found() {
        let (ledger, _, _) = ledger_with_clock();
        let missing = Uuid::new_v4();
        assert!(matches!(
            ledger.resolve(missing, serde_json::json!({})).await,
            Err(LedgerError::NotFound(id)) if id == missing
        ));
        assert!(matches!(
            ledger.purge(missing).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_append() {
        let (ledger, repository, _) = ledger_with_clock();
        repository.set_available(false);
        assert!(matches!(
            ledger
                .append(draft(AuditCategory::Encryption, Severity::Low))
                .await,
            Err(LedgerError::Unavailable(_))
        ));
        assert_eq!(repository.len(), 0);
    }

    #[tokio::test]
    async fn test_query_orders_and_filters() {
        let (ledger, _, clock) = ledger_with_clock();
        let ledger = ledger.with_page_size(2);

        let mut appended = Vec::new();
        for (i, severity) in [Severity::Low, Severity::High, Severity::Low, Severity::High, Severity::Low]
            .into_iter()
            .enumerate()
        {
            // Two events share each instant
            if i % 2 == 0 {
                clock.advance(Duration::seconds(1));
            }
            appended.push(
                ledger
                    .append(draft(AuditCategory::Access, severity))
                    .await
                    .unwrap(),
            );
        }

        let all = ledger.query(AuditFilter::new()).collect().await.unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id).collect();
        let expected: Vec<_> = appended.iter().map(|e| e.id).collect();
        assert_eq!(ids, expected);

        let high = ledger
            .query(AuditFilter::new().severity(Severity::High))
            .collect()
            .await
            .unwrap();
        assert_eq!(high.len(), 2);
        assert!(high.iter().all(|e| e.severity == Severity::High));

        let windowed = ledger
            .query(
                AuditFilter::new()
                    .from(appended[2].timestamp)
                    .until(appended[4].timestamp),
            )
            .collect()
            .await
            .unwrap();
        assert_eq!(windowed.len(), 2);
    }

    #[tokio::test]
    async fn test_query_is_lazy_and_restartable() {
        let (ledger, _, _) = ledger_with_clock();
        let ledger = ledger.with_page_size(3);
        for _ in 0..7 {
            ledger
                .append(draft(AuditCategory::Access, Severity::Low))
                .await
                .unwrap();
        }

        let query = ledger.query(AuditFilter::new());
        let first_two: Vec<_> = query.stream().take(2).collect().await;
        assert_eq!(first_two.len(), 2);

        let full = query.collect().await.unwrap();
        assert_eq!(full.len(), 7);
        assert_eq!(full[0].id, first_two[0].as_ref().unwrap().id);
        let again = query.collect().await.unwrap();
        assert_eq!(full, again);
    }

    #[tokio::test]
    async fn test_single_actor_order_survives_clock_regression() {
        let (ledger, _, clock) = ledger_with_clock();
        let mut ids = Vec::new();
        for i in 0..10 {
            if i == 5 {
                clock.set(start() - Duration::hours(1));
            }
            ids.push(
                ledger
                    .append(draft(AuditCategory::Encryption, Severity::Low))
                    .await
                    .unwrap()
                    .id,
            );
        }
        let read: Vec<_> = ledger
            .query(AuditFilter::new())
            .collect()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(read, ids);
    }

    #[tokio::test]
    async fn test_resume_continues_after_stored_events() {
        let (ledger, repository, _) = ledger_with_clock();
        let earlier = ledger
            .append(draft(AuditCategory::Access, Severity::Low))
            .await
            .unwrap();

        // A fresh ledger over the same store, with the clock an hour behind
        let clock = Arc::new(ManualClock::new(start() - Duration::hours(1)));
        let reopened = AuditLedger::new(Arc::new(repository)).with_clock(clock);
        reopened.resume().await.unwrap();

        let later = reopened
            .append(draft(AuditCategory::Access, Severity::Low))
            .await
            .unwrap();
        assert_eq!(later.timestamp, earlier.timestamp);

        let read: Vec<_> = reopened
            .query(AuditFilter::new())
            .collect()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(read, vec![earlier.id, later.id]);
    }

    #[tokio::test]
    async fn test_resume_on_empty_store_keeps_clock() {
        let (ledger, _, _) = ledger_with_clock();
        ledger.resume().await.unwrap();
        let event = ledger
            .append(draft(AuditCategory::Access, Severity::Low))
            .await
            .unwrap();
        assert_eq!(event.timestamp, start());
    }

    // Delays each insert so the caller can give up mid-write
    #[derive(Clone)]
    struct SlowRepository {
        inner: InMemoryAuditRepository,
    }

    #[async_trait]
    impl AuditRepository for SlowRepository {
        async fn insert(&self, event: AuditEvent) -> Result<AuditEvent, LedgerError> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.inner.insert(event).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<AuditEvent>, LedgerError> {
            self.inner.get(id).await
        }

        async fn mark_resolved(
            &self,
            id: Uuid,
            resolved_at: DateTime<Utc>,
            detail: &serde_json::Value,
        ) -> Result<bool, LedgerError> {
            self.inner.mark_resolved(id, resolved_at, detail).await
        }

        async fn delete(&self, id: Uuid) -> Result<bool, LedgerError> {
            self.inner.delete(id).await
        }

        async fn fetch_page(
            &self,
            filter: &AuditFilter,
            after: Option<EventCursor>,
            limit: u32,
        ) -> Result<Vec<AuditEvent>, LedgerError> {
            self.inner.fetch_page(filter, after, limit).await
        }

        async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, LedgerError> {
            self.inner.latest_timestamp().await
        }
    }

    #[tokio::test]
    async fn test_abandoned_append_still_lands() {
        let inner = InMemoryAuditRepository::new();
        let ledger = AuditLedger::new(Arc::new(SlowRepository {
            inner: inner.clone(),
        }));

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(5),
            ledger.append(draft(AuditCategory::Encryption, Severity::Low)),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(inner.len(), 1);
    }
}
