//! Audit ledger domain module
//!
//! Durable, append-only record of every protected operation.
//!
//! # Architecture
//!
//! - **Entities**: `AuditEvent`, `AuditEventDraft`, `AuditFilter`, and the
//!   `AuditCategory` / `Severity` / `Resolution` enums
//! - **Repository Trait**: `AuditRepository`
//! - **Services**: `AuditLedger` and its restartable `EventQuery`
//! - **Clocks**: `SystemClock` for production, `ManualClock` for retention drills
//!
//! # Guarantees
//!
//! - Appends are durable before they return and cannot be cancelled once issued
//! - `retention_until` is fixed at append time, at least seven years out
//! - Resolution moves from Open to Resolved exactly once
//! - Queries are ordered by (timestamp, sequence) ascending
//!
//! # Example
//!
//! ```ignore
//! use carevault_core::domain::audit::{AuditLedger, AuditEventDraft, AuditCategory, Severity, AuditFilter};
//! use carevault_core::infrastructure::audit::SqliteAuditRepository;
//!
//! let ledger = AuditLedger::new(Arc::new(SqliteAuditRepository::new(db.pool().clone())));
//! let event = ledger
//!     .append(AuditEventDraft::new(AuditCategory::Access, Severity::Low))
//!     .await?;
//!
//! let mut events = ledger.query(AuditFilter::new().severity(Severity::Critical)).stream();
//! while let Some(event) = events.try_next().await? {
//!     println!("{} {}", event.timestamp, event.category);
//! }
//! ```

pub mod clock;
pub mod entity;
pub mod repository;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{
    AuditCategory, AuditEvent, AuditEventDraft, AuditFilter, EventCursor, LedgerError,
    Resolution, Severity,
};
pub use repository::AuditRepository;
pub use service::{AuditLedger, DEFAULT_PAGE_SIZE, EventQuery, EventStream, MIN_RETENTION_YEARS};
