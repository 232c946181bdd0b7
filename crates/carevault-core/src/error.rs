//! Error types for CareVault

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::audit::{LedgerError, Resolution};
use crate::domain::envelope::CipherError;
use crate::domain::identifiers::IdentifierKind;
use crate::domain::keys::KeyError;

/// Result type alias using CareVault's Error
pub type Result<T> = std::result::Result<T, Error>;

/// How a caller is expected to react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad data or a bad caller; retrying the same input cannot succeed
    Input,
    /// Tamper, mismatch, or missing key material; never retried internally
    Cryptographic,
    /// Storage trouble; `LedgerUnavailable` is retryable with backoff
    Infrastructure,
    /// A disallowed lifecycle transition
    Policy,
    Configuration,
    Other,
}

/// CareVault error types with stable codes
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (E001-E099)
    #[error("Invalid {kind} identifier ({})", .codes.join(", "))]
    InvalidIdentifier {
        kind: IdentifierKind,
        codes: Vec<String>,
    },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    // Cryptographic errors (E100-E199)
    #[error("Envelope context does not match the supplied record identity")]
    ContextMismatch,

    #[error("Envelope failed authentication (tampered, corrupted, or wrong key)")]
    Integrity,

    #[error("Key version {0} not found")]
    KeyVersionNotFound(u32),

    #[error("No active key version. Initialize the key store before encrypting.")]
    NoActiveKey,

    #[error("Unsupported envelope format version {0:#04x}")]
    UnsupportedFormatVersion(u8),

    #[error("Key storage error: {0}")]
    KeyStorage(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    // Infrastructure errors (E200-E299)
    #[error("Audit ledger unavailable: {0}. Retry with backoff.")]
    LedgerUnavailable(String),

    #[error("Corrupt audit record: {0}")]
    LedgerCorrupt(String),

    // Policy errors (E300-E399)
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

    #[error("Audit event {0} not found")]
    EventNotFound(Uuid),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier { .. } => "E001",
            Self::MalformedEnvelope(_) => "E002",
            Self::ContextMismatch => "E100",
            Self::Integrity => "E101",
            Self::KeyVersionNotFound(_) => "E102",
            Self::NoActiveKey => "E103",
            Self::UnsupportedFormatVersion(_) => "E104",
            Self::KeyStorage(_) => "E105",
            Self::Encryption(_) => "E106",
            Self::LedgerUnavailable(_) => "E200",
            Self::LedgerCorrupt(_) => "E201",
            Self::Retention { .. } => "E300",
            Self::InvalidTransition { .. } => "E301",
            Self::EventNotFound(_) => "E302",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Classify the error for collaborator retry decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidIdentifier { .. } | Self::MalformedEnvelope(_) => ErrorClass::Input,
            Self::ContextMismatch
            | Self::Integrity
            | Self::KeyVersionNotFound(_)
            | Self::NoActiveKey
            | Self::UnsupportedFormatVersion(_)
            | Self::Encryption(_) => ErrorClass::Cryptographic,
            Self::KeyStorage(_) | Self::LedgerUnavailable(_) | Self::LedgerCorrupt(_) => {
                ErrorClass::Infrastructure
            }
            Self::Retention { .. } | Self::InvalidTransition { .. } | Self::EventNotFound(_) => {
                ErrorClass::Policy
            }
            Self::ConfigError(_) => ErrorClass::Configuration,
            Self::Other(_) | Self::Io(_) => ErrorClass::Other,
        }
    }

    /// Only an unavailable ledger may be retried by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_))
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidIdentifier { kind, .. } => {
                Some(format!("Correct the {} before protecting data keyed to it", kind))
            }
            Self::NoActiveKey => Some("Call KeyStore::initialize during startup".to_string()),
            Self::LedgerUnavailable(_) => {
                Some("Check the ledger storage location and retry".to_string())
            }
            Self::Retention {
                retention_until, ..
            } => Some(format!("Purge is allowed after {}", retention_until.to_rfc3339())),
            Self::ConfigError(_) => Some("Check CAREVAULT_CONFIG_DIR/config.toml".to_string()),
            _ => None,
        }
    }
}

impl From<KeyError> for Error {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::NoActiveKey => Self::NoActiveKey,
            KeyError::VersionNotFound(version) => Self::KeyVersionNotFound(version),
            KeyError::Storage(msg) => Self::KeyStorage(msg),
            other => Self::Encryption(other.to_string()),
        }
    }
}

impl From<CipherError> for Error {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::ContextMismatch => Self::ContextMismatch,
            CipherError::Integrity => Self::Integrity,
            CipherError::Key(key_err) => key_err.into(),
            CipherError::MalformedEnvelope(msg) => Self::MalformedEnvelope(msg),
            CipherError::UnsupportedFormatVersion(version) => {
                Self::UnsupportedFormatVersion(version)
            }
            CipherError::Encryption(msg) => Self::Encryption(msg),
        }
    }
}

impl From<LedgerError> for Error {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(msg) => Self::LedgerUnavailable(msg),
            LedgerError::Corrupt(msg) => Self::LedgerCorrupt(msg),
            LedgerError::Retention {
                event_id,
                retention_until,
            } => Self::Retention {
                event_id,
                retention_until,
            },
            LedgerError::InvalidTransition { event_id, from, to } => {
                Self::InvalidTransition { event_id, from, to }
            }
            LedgerError::NotFound(event_id) => Self::EventNotFound(event_id),
        }
    }
}
