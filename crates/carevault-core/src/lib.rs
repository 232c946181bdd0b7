//! CareVault Core Library
//!
//! This crate provides the compliance-grade data-protection core, including:
//! - Field-level envelope encryption with versioned, rotating master keys
//! - Healthcare identifier checksums and clinical message structure checks
//! - An append-only, retention-enforced audit ledger (SQLite-backed)
//! - The compliance facade that pairs every protected operation with an audit record
//! - Configuration, storage bootstrap, and tracing setup

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod storage;
pub mod telemetry;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::audit::{
        AuditCategory, AuditEvent, AuditEventDraft, AuditFilter, AuditLedger, Resolution,
        Severity,
    };
    pub use crate::domain::compliance::{
        ArtifactKind, ComplianceFacade, RetryPolicy, ValidationScope,
    };
    pub use crate::domain::envelope::{EncryptionEnvelope, EnvelopeCipher};
    pub use crate::domain::identifiers::{
        HealthcareIdentifier, IdentifierKind, IdentifierValidator, MessageFormat,
        ValidationResult,
    };
    pub use crate::domain::keys::{KeyStore, KeyVersion};
    pub use crate::error::{Error, Result};
}
