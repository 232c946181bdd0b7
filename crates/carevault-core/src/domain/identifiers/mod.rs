//! Identifier validation domain module
//!
//! Structural and checksum validation of healthcare identifiers and message
//! fragments. Everything here is pure computation: no I/O, no shared state.
//!
//! # Architecture
//!
//! - **Types**: `IdentifierKind`, `HealthcareIdentifier`, `MessageFormat`
//! - **Results**: `ValidationResult` with ordered `ValidationIssue`s and a quality score
//! - **Schemes**: `IdentifierScheme` strategies keyed by kind; `WeightedModulusScheme`
//!   covers the national number and any weighted-sum/modulus regional scheme
//! - **Structure checks**: segmented messages, resource documents, imaging metadata
//!
//! Validation never fails with an error: every problem becomes an issue with
//! a stable code from [`codes`].
//!
//! # Example
//!
//! ```ignore
//! use carevault_core::domain::identifiers::{IdentifierValidator, MessageFormat};
//!
//! let validator = IdentifierValidator::default();
//! assert!(validator.validate_national_number("943 476 5919").valid);
//!
//! let result = validator.validate_structured_message("PID|1||123", MessageFormat::SegmentedMessage);
//! assert!(!result.valid);
//! assert!(result.quality_score < 1.0);
//! ```

mod imaging;
mod message;
mod resource;
pub mod result;
pub mod scheme;
pub mod types;
pub mod validator;

pub use result::{ValidationIssue, ValidationResult, codes};
pub use scheme::{CheckDigitRule, IdentifierScheme, SchemeError, WeightedModulusScheme};
pub use types::{HealthcareIdentifier, IdentifierKind, MessageFormat};
pub use validator::IdentifierValidator;
