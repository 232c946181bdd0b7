//! Identifier and message format types

use serde::{Deserialize, Serialize};

/// Kind of healthcare identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// National patient number (10 digits, mod-11 check digit)
    NationalNumber,
    /// First regional patient number scheme
    RegionalNumberA,
    /// Second regional patient number scheme
    RegionalNumberB,
}

impl IdentifierKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NationalNumber => "national_number",
            Self::RegionalNumberA => "regional_number_a",
            Self::RegionalNumberB => "regional_number_b",
        }
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A patient identifier as supplied by a caller
///
/// Validity is a pure function of `raw`; nothing about an identifier is stored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthcareIdentifier {
    pub kind: IdentifierKind,
    pub raw: String,
}

impl HealthcareIdentifier {
    pub fn new(kind: IdentifierKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }

    pub fn national(raw: impl Into<String>) -> Self {
        Self::new(IdentifierKind::NationalNumber, raw)
    }
}

// Identifiers are patient data; keep them out of logs and panic messages.
impl std::fmt::Debug for HealthcareIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthcareIdentifier")
            .field("kind", &self.kind)
            .field("raw", &"[REDACTED]")
            .finish()
    }
}

/// Structured payload formats understood by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// Pipe-delimited clinical message (MSH header segment first)
    SegmentedMessage,
    /// JSON resource document keyed by `resourceType`
    ResourceDocument,
    /// Imaging metadata in the DICOM JSON model
    ImagingMetadata,
}

impl MessageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SegmentedMessage => "segmented_message",
            Self::ResourceDocument => "resource_document",
            Self::ImagingMetadata => "imaging_metadata",
        }
    }
}

impl std::fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
