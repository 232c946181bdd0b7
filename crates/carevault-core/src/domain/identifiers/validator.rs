//! Identifier validator
//!
//! Dispatches identifier validation to the scheme registered for each kind
//! and structured payloads to their format checker.

use std::collections::HashMap;
use std::sync::Arc;

use super::result::{RuleTracker, ValidationResult, codes};
use super::scheme::{IdentifierScheme, WeightedModulusScheme};
use super::types::{HealthcareIdentifier, IdentifierKind, MessageFormat};
use super::{imaging, message, resource};

/// Stateless validator for identifiers and structured payloads
///
/// The national number scheme is always registered. Regional kinds have no
/// scheme until one is supplied with [`with_scheme`](Self::with_scheme);
/// until then they validate as `SCHEME_NOT_CONFIGURED`.
#[derive(Clone)]
pub struct IdentifierValidator {
    schemes: HashMap<IdentifierKind, Arc<dyn IdentifierScheme>>,
}

impl Default for IdentifierValidator {
    fn default() -> Self {
        let mut schemes: HashMap<IdentifierKind, Arc<dyn IdentifierScheme>> = HashMap::new();
        schemes.insert(
            IdentifierKind::NationalNumber,
            Arc::new(WeightedModulusScheme::national()),
        );
        Self { schemes }
    }
}

impl std::fmt::Debug for IdentifierValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.schemes.keys().map(IdentifierKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("IdentifierValidator")
            .field("schemes", &kinds)
            .finish()
    }
}

impl IdentifierValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the scheme for `kind`
    pub fn with_scheme(mut self, kind: IdentifierKind, scheme: impl IdentifierScheme + 'static) -> Self {
        self.schemes.insert(kind, Arc::new(scheme));
        self
    }

    /// Whether a scheme is registered for `kind`
    pub fn has_scheme(&self, kind: IdentifierKind) -> bool {
        self.schemes.contains_key(&kind)
    }

    /// Validate a national patient number
    pub fn validate_national_number(&self, raw: &str) -> ValidationResult {
        self.validate_kind(IdentifierKind::NationalNumber, raw)
    }

    /// Validate a regional patient number with the scheme registered for `kind`
    pub fn validate_regional_number(&self, raw: &str, kind: IdentifierKind) -> ValidationResult {
        self.validate_kind(kind, raw)
    }

    /// Validate an identifier according to its own kind
    pub fn validate_identifier(&self, identifier: &HealthcareIdentifier) -> ValidationResult {
        self.validate_kind(identifier.kind, &identifier.raw)
    }

    fn validate_kind(&self, kind: IdentifierKind, raw: &str) -> ValidationResult {
        match self.schemes.get(&kind) {
            Some(scheme) => scheme.validate(raw),
            None => {
                let mut tracker = RuleTracker::new();
                tracker.fail(
                    codes::SCHEME_NOT_CONFIGURED,
                    format!("No validation scheme is configured for {}", kind),
                    None,
                );
                tracker.finish(None)
            }
        }
    }

    /// Check the structural invariants of a payload in `format`
    ///
    /// Never fails: malformed input produces an invalid result.
    pub fn validate_structured_message(
        &self,
        payload: &str,
        format: MessageFormat,
    ) -> ValidationResult {
        match format {
            MessageFormat::SegmentedMessage => message::validate(payload),
            MessageFormat::ResourceDocument => resource::validate(payload),
            MessageFormat::ImagingMetadata => imaging::validate(payload),
        }
    }
}
