//! Validation results

use serde::{Deserialize, Serialize};

/// Stable issue codes
pub mod codes {
    // Identifiers
    pub const EMPTY_IDENTIFIER: &str = "EMPTY_IDENTIFIER";
    pub const INVALID_CHARACTERS: &str = "INVALID_CHARACTERS";
    pub const INVALID_LENGTH: &str = "INVALID_LENGTH";
    pub const CHECKSUM_MISMATCH: &str = "CHECKSUM_MISMATCH";
    pub const UNASSIGNABLE_CHECK_DIGIT: &str = "UNASSIGNABLE_CHECK_DIGIT";
    pub const SCHEME_NOT_CONFIGURED: &str = "SCHEME_NOT_CONFIGURED";

    // Segmented messages
    pub const EMPTY_MESSAGE: &str = "EMPTY_MESSAGE";
    pub const MISSING_HEADER_SEGMENT: &str = "MISSING_HEADER_SEGMENT";
    pub const HEADER_TOO_SHORT: &str = "HEADER_TOO_SHORT";
    pub const INVALID_FIELD_SEPARATOR: &str = "INVALID_FIELD_SEPARATOR";
    pub const INVALID_ENCODING_CHARACTERS: &str = "INVALID_ENCODING_CHARACTERS";
    pub const INVALID_SEGMENT_ID: &str = "INVALID_SEGMENT_ID";
    pub const INCONSISTENT_FIELD_SEPARATOR: &str = "INCONSISTENT_FIELD_SEPARATOR";
    pub const MISSING_MESSAGE_TYPE: &str = "MISSING_MESSAGE_TYPE";
    pub const MISSING_CONTROL_ID: &str = "MISSING_CONTROL_ID";
    pub const MISSING_VERSION_ID: &str = "MISSING_VERSION_ID";

    // JSON documents
    pub const INVALID_JSON: &str = "INVALID_JSON";
    pub const NOT_AN_OBJECT: &str = "NOT_AN_OBJECT";

    // Resource documents
    pub const MISSING_RESOURCE_TYPE: &str = "MISSING_RESOURCE_TYPE";
    pub const UNKNOWN_RESOURCE_TYPE: &str = "UNKNOWN_RESOURCE_TYPE";
    pub const MISSING_REQUIRED_FIELD: &str = "MISSING_REQUIRED_FIELD";
    pub const INVALID_RESOURCE_ID: &str = "INVALID_RESOURCE_ID";
    pub const MISSING_ENTRY_RESOURCE: &str = "MISSING_ENTRY_RESOURCE";
    pub const NESTING_TOO_DEEP: &str = "NESTING_TOO_DEEP";

    // Imaging metadata
    pub const INVALID_TAG: &str = "INVALID_TAG";
    pub const INVALID_VR: &str = "INVALID_VR";
    pub const MISSING_QUERY_LEVEL: &str = "MISSING_QUERY_LEVEL";
    pub const UNKNOWN_QUERY_LEVEL: &str = "UNKNOWN_QUERY_LEVEL";
    pub const MISSING_REQUIRED_TAG: &str = "MISSING_REQUIRED_TAG";
    pub const INVALID_UID: &str = "INVALID_UID";
    pub const INVALID_DATE: &str = "INVALID_DATE";
}

/// A single detected problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Stable machine-readable code (see [`codes`])
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Where the problem was found (segment, field path, tag), if applicable
    pub location: Option<String>,
}

/// Outcome of one validation call
///
/// Produced fresh per call and never stored by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Problems in detection order
    pub errors: Vec<ValidationIssue>,
    /// `1 - errors / rules_checked`, in `[0.0, 1.0]`
    pub quality_score: f64,
    /// Number of rules evaluated
    pub rules_checked: u32,
    /// Canonical form of a valid identifier; `None` for messages and invalid input
    pub normalized: Option<String>,
}

impl ValidationResult {
    /// Whether any issue carries `code`
    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// Distinct issue codes, in first-seen order
    pub fn error_codes(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for issue in &self.errors {
            if !out.contains(&issue.code) {
                out.push(issue.code.clone());
            }
        }
        out
    }
}

/// Accumulates rule outcomes while a validator runs
#[derive(Debug, Default)]
pub(crate) struct RuleTracker {
    rules: u32,
    errors: Vec<ValidationIssue>,
}

impl RuleTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a passed rule
    pub(crate) fn pass(&mut self) {
        self.rules += 1;
    }

    /// Record a failed rule
    pub(crate) fn fail(
        &mut self,
        code: &str,
        message: impl Into<String>,
        location: Option<String>,
    ) {
        self.rules += 1;
        self.errors.push(ValidationIssue {
            code: code.to_string(),
            message: message.into(),
            location,
        });
    }

    /// Record a rule that passed if `ok`, returning `ok`
    pub(crate) fn check(
        &mut self,
        ok: bool,
        code: &str,
        message: impl Into<String>,
        location: Option<String>,
    ) -> bool {
        if ok {
            self.pass();
        } else {
            self.fail(code, message, location);
        }
        ok
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn finish(self, normalized: Option<String>) -> ValidationResult {
        let valid = self.errors.is_empty();
        let quality_score = if self.rules == 0 {
            if valid { 1.0 } else { 0.0 }
        } else {
            (1.0 - self.errors.len() as f64 / self.rules as f64).clamp(0.0, 1.0)
        };
        ValidationResult {
            valid,
            errors: self.errors,
            quality_score,
            rules_checked: self.rules,
            normalized: if valid { normalized } else { None },
        }
    }
}
