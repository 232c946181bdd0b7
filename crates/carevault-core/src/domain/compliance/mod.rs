//! Compliance facade domain module
//!
//! Composes the key store, envelope cipher, identifier validator, and audit
//! ledger so that no protected operation completes without its audit record.
//!
//! # Audit mapping
//!
//! | Operation | Category | Severity |
//! |---|---|---|
//! | `protect_field` | Encryption | Low on success, High on failure |
//! | `reveal_field` | Decryption | Low; Critical + subject impact on mismatch or tamper; High otherwise |
//! | `validate_artifact` | Validation | Medium, invalid results only |
//! | `rotate_keys` | KeyRotation | Low on success, High on failure |
//! | `record_access` | Access | Low |
//!
//! # Example
//!
//! ```ignore
//! use carevault_core::prelude::*;
//!
//! let facade = carevault_core::bootstrap::open_facade(&Config::load()?).await?;
//! let id = HealthcareIdentifier::national("9434765919");
//! let envelope = facade.protect_field(b"allergy: penicillin", &id).await?;
//! let plaintext = facade.reveal_field(&envelope, &id).await?;
//! ```

pub mod retry;
pub mod service;
pub mod types;

pub use retry::RetryPolicy;
pub use service::ComplianceFacade;
pub use types::{ArtifactKind, ValidationScope};
