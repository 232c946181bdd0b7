//! Audit ledger entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Audit ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Audit ledger data is corrupt: {0}")]
    Corrupt(String),

    #[error("Audit event {event_id} is retained until {retention_until}")]
    Retention {
        event_id: Uuid,
        retention_until: DateTime<Utc>,
    },

    #[error("Audit event {event_id} cannot move from {from} to {to}")]
    InvalidTransition {
        event_id: Uuid,
        from: Resolution,
        to: Resolution,
    },

    #[error("Audit event not found: {0}")]
    NotFound(Uuid),
}

/// What kind of protected operation an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Encryption,
    Decryption,
    Validation,
    KeyRotation,
    Access,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encryption => "encryption",
            Self::Decryption => "decryption",
            Self::Validation => "validation",
            Self::KeyRotation => "key_rotation",
            Self::Access => "access",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "encryption" => Some(Self::Encryption),
            "decryption" => Some(Self::Decryption),
            "validation" => Some(Self::Validation),
            "key_rotation" => Some(Self::KeyRotation),
            "access" => Some(Self::Access),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolution state of an event
///
/// Two states, one legal transition: `Open -> Resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Open,
    Resolved,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: Resolution) -> bool {
        matches!((self, next), (Self::Open, Self::Resolved))
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied part of an event, before the ledger stamps it
///
/// `detail` must never carry plaintext, raw identifiers, or key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEventDraft {
    pub category: AuditCategory,
    pub severity: Severity,
    pub subject_impact: bool,
    pub detail: serde_json::Value,
}

impl AuditEventDraft {
    pub fn new(category: AuditCategory, severity: Severity) -> Self {
        Self {
            category,
            severity,
            subject_impact: false,
            detail: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_subject_impact(mut self, subject_impact: bool) -> Self {
        self.subject_impact = subject_impact;
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// A finalized ledger record
///
/// Only `resolution`, `resolved_at`, and `resolution_detail` ever change, and
/// only once, from Open to Resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Ledger-assigned insertion number; orders events sharing a timestamp
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub severity: Severity,
    /// Whether a patient is affected
    pub subject_impact: bool,
    pub detail: serde_json::Value,
    pub resolution: Resolution,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_detail: Option<serde_json::Value>,
    /// Earliest instant at which the event may be purged
    pub retention_until: DateTime<Utc>,
}

impl AuditEvent {
    /// Build an unsaved Open event; the repository assigns `sequence`
    pub(crate) fn from_draft(
        draft: AuditEventDraft,
        timestamp: DateTime<Utc>,
        retention_until: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            timestamp,
            category: draft.category,
            severity: draft.severity,
            subject_impact: draft.subject_impact,
            detail: draft.detail,
            resolution: Resolution::Open,
            resolved_at: None,
            resolution_detail: None,
            retention_until,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resolution == Resolution::Open
    }

    /// Whether the retention window has elapsed at `now`
    pub fn is_purgeable_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.retention_until
    }
}

/// Query filter; every field is optional and all given fields must match
///
/// The date range is half-open: `from <= timestamp < until`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub severity: Option<Severity>,
    pub category: Option<AuditCategory>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn category(mut self, category: AuditCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.from.is_none_or(|from| event.timestamp >= from)
            && self.until.is_none_or(|until| event.timestamp < until)
            && self.severity.is_none_or(|s| event.severity == s)
            && self.category.is_none_or(|c| event.category == c)
    }
}

/// Keyset pagination position: the last event already returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCursor {
    pub timestamp: DateTime<Utc>,
    pub sequence: i64,
}

impl EventCursor {
    pub fn after(event: &AuditEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            sequence: event.sequence,
        }
    }

    /// Whether `event` sorts strictly after this position
    pub fn precedes(&self, event: &AuditEvent) -> bool {
        (event.timestamp, event.sequence) > (self.timestamp, self.sequence)
    }
}
