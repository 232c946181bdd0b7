//! Identifier checksum schemes
//!
//! Each identifier kind is validated by one [`IdentifierScheme`]. The national
//! number is a [`WeightedModulusScheme`]; regional kinds get theirs registered
//! on the validator once their parameters are known.

use thiserror::Error;

use super::result::{RuleTracker, ValidationResult, codes};

/// Errors raised when building a scheme
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemeError {
    #[error("Expected {expected} weights for a {length}-digit identifier, got {actual}")]
    WeightCount {
        length: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Identifier length must be at least 2, got {0}")]
    LengthTooShort(usize),

    #[error("Modulus must be at least 2, got {0}")]
    InvalidModulus(u32),
}

/// A validation strategy for one identifier kind
pub trait IdentifierScheme: Send + Sync {
    /// Short human-readable name, used in logs and issue messages
    fn name(&self) -> &str;

    /// Validate a raw identifier
    fn validate(&self, raw: &str) -> ValidationResult;
}

/// How the weighted-sum remainder maps to the expected check digit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDigitRule {
    /// `(modulus - remainder) % modulus`
    Complement,
    /// `remainder` itself
    Remainder,
}

impl CheckDigitRule {
    /// Expected check digit, or `None` when the mapped value is not a single digit
    fn expected(&self, remainder: u32, modulus: u32) -> Option<u32> {
        let value = match self {
            Self::Complement => (modulus - remainder) % modulus,
            Self::Remainder => remainder,
        };
        (value <= 9).then_some(value)
    }
}

/// Fixed-length numeric identifier with a trailing weighted-sum check digit
///
/// The first `length - 1` digits are multiplied by `weights`, summed, and
/// reduced modulo `modulus`. ASCII spaces and hyphens are stripped before
/// checking, so `943 476 5919` and `943-476-5919` are accepted.
#[derive(Debug, Clone)]
pub struct WeightedModulusScheme {
    name: String,
    length: usize,
    weights: Vec<u32>,
    modulus: u32,
    rule: CheckDigitRule,
}

impl WeightedModulusScheme {
    pub fn new(
        name: impl Into<String>,
        length: usize,
        weights: Vec<u32>,
        modulus: u32,
        rule: CheckDigitRule,
    ) -> Result<Self, SchemeError> {
        if length < 2 {
            return Err(SchemeError::LengthTooShort(length));
        }
        if weights.len() != length - 1 {
            return Err(SchemeError::WeightCount {
                length,
                expected: length - 1,
                actual: weights.len(),
            });
        }
        if modulus < 2 {
            return Err(SchemeError::InvalidModulus(modulus));
        }
        Ok(Self {
            name: name.into(),
            length,
            weights,
            modulus,
            rule,
        })
    }

    /// The national patient number: 10 digits, weights 10 down to 2, mod 11.
    ///
    /// Remainder 0 maps to check digit 0; remainder 1 would need check digit
    /// 10, so such numbers are never issued and always rejected.
    pub fn national() -> Self {
        Self {
            name: "national number".to_string(),
            length: 10,
            weights: (2..=10).rev().collect(),
            modulus: 11,
            rule: CheckDigitRule::Complement,
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Strip the separators people type into identifiers
    pub fn normalize(raw: &str) -> String {
        raw.chars().filter(|c| *c != ' ' && *c != '-').collect()
    }
}

impl IdentifierScheme for WeightedModulusScheme {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, raw: &str) -> ValidationResult {
        let normalized = Self::normalize(raw);
        let mut tracker = RuleTracker::new();

        if !tracker.check(
            !normalized.is_empty(),
            codes::EMPTY_IDENTIFIER,
            format!("{} is empty", self.name),
            None,
        ) {
            return tracker.finish(None);
        }

        let bad_position = normalized.chars().position(|c| !c.is_ascii_digit());
        let digits_ok = tracker.check(
            bad_position.is_none(),
            codes::INVALID_CHARACTERS,
            format!("{} must contain only digits", self.name),
            bad_position.map(|p| format!("position {}", p + 1)),
        );

        let length = normalized.chars().count();
        let length_ok = tracker.check(
            length == self.length,
            codes::INVALID_LENGTH,
            format!(
                "{} must have {} digits, found {}",
                self.name, self.length, length
            ),
            None,
        );

        if !(digits_ok && length_ok) {
            return tracker.finish(None);
        }

        // All ASCII digits from here on
        let digits: Vec<u32> = normalized.bytes().map(|b| u32::from(b - b'0')).collect();
        let (body, check) = digits.split_at(self.length - 1);
        // Reduced at every step in u64 so caller-supplied weights cannot overflow
        let modulus = u64::from(self.modulus);
        let remainder = body
            .iter()
            .zip(&self.weights)
            .fold(0u64, |acc, (d, w)| (acc + u64::from(*d) * u64::from(*w)) % modulus);
        // Below `self.modulus`, so it fits
        let remainder = remainder as u32;
        let location = Some(format!("position {}", self.length));

        match self.rule.expected(remainder, self.modulus) {
            None => tracker.fail(
                codes::UNASSIGNABLE_CHECK_DIGIT,
                format!(
                    "Weighted sum remainder {} has no valid check digit; this {} cannot exist",
                    remainder, self.name
                ),
                location,
            ),
            Some(expected) => {
                tracker.check(
                    check[0] == expected,
                    codes::CHECKSUM_MISMATCH,
                    format!("Check digit does not match the weighted checksum of the {}", self.name),
                    location,
                );
            }
        }

        tracker.finish(Some(normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_number_is_valid() {
        let result = WeightedModulusScheme::national().validate("9434765919");
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.quality_score, 1.0);
        assert_eq!(result.normalized.as_deref(), Some("9434765919"));
    }

    #[test]
    fn test_every_other_last_digit_is_invalid() {
        let scheme = WeightedModulusScheme::national();
        for digit in (0..=9).filter(|d| *d != 9) {
            let raw = format!("943476591{}", digit);
            let result = scheme.validate(&raw);
            assert!(!result.valid, "{} should be invalid", raw);
            assert!(result.has_error(codes::CHECKSUM_MISMATCH));
            assert!(result.quality_score < 1.0);
        }
    }

    #[test]
    fn test_separators_are_stripped() {
        let scheme = WeightedModulusScheme::national();
        assert!(scheme.validate("943 476 5919").valid);
        assert!(scheme.validate("943-476-5919").valid);
        assert_eq!(
            scheme.validate(" 943-476 5919 ").normalized.as_deref(),
            Some("9434765919")
        );
    }

    #[test]
    fn test_remainder_zero_maps_to_check_zero() {
        // 2*10 + 1*2 = 22, 22 % 11 = 0
        let result = WeightedModulusScheme::national().validate("2000000010");
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn test_remainder_one_is_unassignable() {
        // 1*10 = 10, + 1*2 = 12, 12 % 11 = 1
        let scheme = WeightedModulusScheme::national();
        for last in 0..=9 {
            let result = scheme.validate(&format!("100000001{}", last));
            assert!(!result.valid);
            assert!(result.has_error(codes::UNASSIGNABLE_CHECK_DIGIT));
            assert!(!result.has_error(codes::CHECKSUM_MISMATCH));
        }
    }

    #[test]
    fn test_length_and_charset_codes_are_distinct() {
        let scheme = WeightedModulusScheme::national();

        let short = scheme.validate("943476591");
        assert!(short.has_error(codes::INVALID_LENGTH));
        assert!(!short.has_error(codes::INVALID_CHARACTERS));

        let letters = scheme.validate("94347659A9");
        assert!(letters.has_error(codes::INVALID_CHARACTERS));
        assert!(!letters.has_error(codes::INVALID_LENGTH));
        assert_eq!(letters.errors[0].location.as_deref(), Some("position 9"));

        let empty = scheme.validate("  ");
        assert!(empty.has_error(codes::EMPTY_IDENTIFIER));
        assert_eq!(empty.quality_score, 0.0);
    }

    #[test]
    fn test_non_ascii_digits_rejected() {
        // Arabic-Indic digits are numeric but not ASCII
        let result = WeightedModulusScheme::national().validate("٩٤٣٤٧٦٥٩١٩");
        assert!(result.has_error(codes::INVALID_CHARACTERS));
    }

    #[test]
    fn test_custom_scheme_construction() {
        let scheme =
            WeightedModulusScheme::new("test", 4, vec![3, 2, 1], 10, CheckDigitRule::Remainder)
                .unwrap();
        // 1*3 + 2*2 + 3*1 = 10 -> remainder 0 -> check 0
        assert!(scheme.validate("1230").valid);
        assert!(!scheme.validate("1231").valid);

        assert_eq!(
            WeightedModulusScheme::new("bad", 4, vec![1, 2], 10, CheckDigitRule::Remainder)
                .unwrap_err(),
            SchemeError::WeightCount {
                length: 4,
                expected: 3,
                actual: 2
            }
        );
        assert!(matches!(
            WeightedModulusScheme::new("bad", 2, vec![1], 1, CheckDigitRule::Remainder),
            Err(SchemeError::InvalidModulus(1))
        ));
    }

    #[test]
    fn test_large_weights_do_not_overflow() {
        let scheme = WeightedModulusScheme::new(
            "regional",
            3,
            vec![u32::MAX, 1],
            11,
            CheckDigitRule::Complement,
        )
        .unwrap();
        // u32::MAX % 11 = 3, so 9*3 + 1*1 = 28 -> remainder 6 -> check 5
        assert!(scheme.validate("915").valid);

        let result = scheme.validate("910");
        assert!(!result.valid);
        assert!(result.has_error(codes::CHECKSUM_MISMATCH));
    }
}
