use serde::{Deserialize, Serialize};

use crate::domain::identifiers::{IdentifierKind, MessageFormat};

/// What `validate_artifact` is asked to check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum ArtifactKind {
    Identifier(IdentifierKind),
    Message(MessageFormat),
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identifier(kind) => kind.as_str(),
            Self::Message(format) => format.as_str(),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The context a validation runs in
///
/// Failures during a patient-data migration are flagged as subject-impacting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ValidationScope {
    #[default]
    Routine,
    PatientDataMigration { migration_id: String },
}

impl ValidationScope {
    pub fn migration(migration_id: impl Into<String>) -> Self {
        Self::PatientDataMigration {
            migration_id: migration_id.into(),
        }
    }

    pub fn is_patient_data_migration(&self) -> bool {
        matches!(self, Self::PatientDataMigration { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::PatientDataMigration { .. } => "patient_data_migration",
        }
    }
}
