//! Compliance facade
//!
//! Pairs every protected operation with exactly one audit record.

use std::sync::Arc;

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::retry::RetryPolicy;
use super::types::{ArtifactKind, ValidationScope};
use crate::domain::audit::{
    AuditCategory, AuditEvent, AuditEventDraft, AuditFilter, AuditLedger, EventQuery,
    LedgerError, Severity,
};
use crate::domain::envelope::{EncryptionEnvelope, EnvelopeCipher};
use crate::domain::identifiers::{HealthcareIdentifier, IdentifierValidator, ValidationResult};
use crate::domain::keys::{KeyStore, KeyVersion, KeyVersionInfo};
use crate::error::{Error, Result};

const RECORD_CONTEXT_LABEL: &[u8] = b"carevault/record-context/v1";

/// Entry point for protected operations
///
/// Each operation appends its audit event before returning. If the ledger
/// stays unavailable through every retry, the operation fails with
/// `LedgerUnavailable` and its result (envelope or plaintext) is dropped.
#[derive(Clone)]
pub struct ComplianceFacade {
    validator: IdentifierValidator,
    cipher: EnvelopeCipher,
    keys: Arc<KeyStore>,
    ledger: Arc<AuditLedger>,
    retry: RetryPolicy,
}

impl ComplianceFacade {
    pub fn new(validator: IdentifierValidator, keys: Arc<KeyStore>, ledger: Arc<AuditLedger>) -> Self {
        Self {
            validator,
            cipher: EnvelopeCipher::new(Arc::clone(&keys)),
            keys,
            ledger,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validator(&self) -> &IdentifierValidator {
        &self.validator
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    /// Encrypt a field value belonging to the record keyed by `identifier`
    pub async fn protect_field(
        &self,
        plaintext: &[u8],
        identifier: &HealthcareIdentifier,
    ) -> Result<EncryptionEnvelope> {
        let outcome = match self.record_context(identifier) {
            Ok(context) => {
                let cipher = self.cipher.clone();
                let data = Zeroizing::new(plaintext.to_vec());
                run_blocking(move || cipher.encrypt(&data, &context).map_err(Error::from)).await
            }
            Err(err) => Err(err),
        };

        let (severity, detail) = match &outcome {
            Ok(envelope) => (
                Severity::Low,
                json!({
                    "operation": "protect_field",
                    "outcome": "success",
                    "identifier_kind": identifier.kind.as_str(),
                    "key_version": envelope.key_version(),
                }),
            ),
            Err(err) => (
                Severity::High,
                failure_detail("protect_field", identifier, err),
            ),
        };

        self.record(
            AuditEventDraft::new(AuditCategory::Encryption, severity).with_detail(detail),
        )
        .await?;
        outcome
    }

    /// Decrypt a field value belonging to the record keyed by `identifier`
    ///
    /// A context mismatch or integrity failure is recorded as Critical and
    /// subject-impacting before the error is returned.
    pub async fn reveal_field(
        &self,
        envelope: &EncryptionEnvelope,
        identifier: &HealthcareIdentifier,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let outcome = match self.record_context(identifier) {
            Ok(context) => {
                let cipher = self.cipher.clone();
                let envelope = envelope.clone();
                run_blocking(move || cipher.decrypt(&envelope, &context).map_err(Error::from))
                    .await
            }
            Err(err) => Err(err),
        };

        let draft = match &outcome {
            Ok(_) => AuditEventDraft::new(AuditCategory::Decryption, Severity::Low).with_detail(
                json!({
                    "operation": "reveal_field",
                    "outcome": "success",
                    "identifier_kind": identifier.kind.as_str(),
                    "key_version": envelope.key_version(),
                }),
            ),
            Err(err @ (Error::ContextMismatch | Error::Integrity)) => {
                warn!(
                    key_version = envelope.key_version(),
                    code = err.code(),
                    "Envelope rejected during decryption"
                );
                AuditEventDraft::new(AuditCategory::Decryption, Severity::Critical)
                    .with_subject_impact(true)
                    .with_detail(failure_detail("reveal_field", identifier, err))
            }
            Err(err) => AuditEventDraft::new(AuditCategory::Decryption, Severity::High)
                .with_detail(failure_detail("reveal_field", identifier, err)),
        };

        self.record(draft).await?;
        outcome
    }

    /// Validate an identifier or structured message
    ///
    /// Only invalid results are audited.
    pub async fn validate_artifact(
        &self,
        payload: &str,
        artifact: ArtifactKind,
        scope: &ValidationScope,
    ) -> Result<ValidationResult> {
        let result = match artifact {
            ArtifactKind::Identifier(kind) => self
                .validator
                .validate_identifier(&HealthcareIdentifier::new(kind, payload)),
            ArtifactKind::Message(format) => {
                self.validator.validate_structured_message(payload, format)
            }
        };

        if result.valid {
            return Ok(result);
        }

        let mut detail = json!({
            "operation": "validate_artifact",
            "artifact": artifact.as_str(),
            "scope": scope.as_str(),
            "error_codes": result.error_codes(),
            "quality_score": result.quality_score,
            "rules_checked": result.rules_checked,
        });
        if let ValidationScope::PatientDataMigration { migration_id } = scope {
            detail["migration_id"] = json!(migration_id);
        }

        self.record(
            AuditEventDraft::new(AuditCategory::Validation, Severity::Medium)
                .with_subject_impact(scope.is_patient_data_migration())
                .with_detail(detail),
        )
        .await?;
        Ok(result)
    }

    /// Rotate the master key
    ///
    /// Called by an external scheduler; the facade holds no timer.
    pub async fn rotate_keys(&self) -> Result<KeyVersion> {
        let previous = self.keys.current_key_version().ok().map(|k| k.version);
        let outcome = self.keys.rotate().await.map_err(Error::from);

        let (severity, detail) = match &outcome {
            Ok(created) => (
                Severity::Low,
                json!({
                    "operation": "rotate_keys",
                    "outcome": "success",
                    "key_version": created.version,
                    "previous_version": previous,
                }),
            ),
            Err(err) => (
                Severity::High,
                json!({
                    "operation": "rotate_keys",
                    "outcome": "failure",
                    "error_code": err.code(),
                    "previous_version": previous,
                }),
            ),
        };

        self.record(AuditEventDraft::new(AuditCategory::KeyRotation, severity).with_detail(detail))
            .await?;
        outcome
    }

    /// Record that `actor` accessed `resource`
    ///
    /// The caller must keep identifiers and plaintext out of all three arguments.
    pub async fn record_access(
        &self,
        actor: &str,
        resource: &str,
        detail: serde_json::Value,
    ) -> Result<AuditEvent> {
        self.record(
            AuditEventDraft::new(AuditCategory::Access, Severity::Low).with_detail(json!({
                "operation": "record_access",
                "actor": actor,
                "resource": resource,
                "detail": detail,
            })),
        )
        .await
    }

    /// Mark an open event as resolved
    pub async fn resolve_event(
        &self,
        event_id: Uuid,
        detail: serde_json::Value,
    ) -> Result<AuditEvent> {
        Ok(self.ledger.resolve(event_id, detail).await?)
    }

    /// Query recorded events
    pub fn audit_events(&self, filter: AuditFilter) -> EventQuery {
        self.ledger.query(filter)
    }

    /// Key version metadata, without material
    pub fn key_versions(&self) -> Vec<KeyVersionInfo> {
        self.keys.key_versions()
    }

    /// Validate `identifier` and derive its opaque record context
    fn record_context(&self, identifier: &HealthcareIdentifier) -> Result<Vec<u8>> {
        let result = self.validator.validate_identifier(identifier);
        if !result.valid {
            return Err(Error::InvalidIdentifier {
                kind: identifier.kind,
                codes: result.error_codes(),
            });
        }
        let normalized = result.normalized.ok_or_else(|| Error::InvalidIdentifier {
            kind: identifier.kind,
            codes: Vec::new(),
        })?;

        let mut hasher = Sha256::new();
        hasher.update(RECORD_CONTEXT_LABEL);
        hasher.update(identifier.kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized.as_bytes());
        Ok(hasher.finalize().to_vec())
    }

    /// Append with bounded retries on `Unavailable`
    async fn record(&self, draft: AuditEventDraft) -> Result<AuditEvent> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.ledger.append(draft.clone()).await {
                Ok(event) => return Ok(event),
                Err(LedgerError::Unavailable(reason)) if self.retry.should_retry(attempts) => {
                    let backoff = self.retry.backoff(attempts);
                    warn!(
                        attempt = attempts,
                        wait_ms = backoff.as_millis() as u64,
                        category = %draft.category,
                        reason = %reason,
                        "Audit ledger unavailable, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    error!(
                        attempts,
                        category = %draft.category,
                        severity = %draft.severity,
                        error = %err,
                        "Audit append failed, aborting operation"
                    );
                    return Err(err.into());
                }
            }
        }
    }
}

impl std::fmt::Debug for ComplianceFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceFacade")
            .field("validator", &self.validator)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Audit detail for a failed field operation; carries codes, never values
fn failure_detail(operation: &str, identifier: &HealthcareIdentifier, err: &Error) -> serde_json::Value {
    let mut detail = json!({
        "operation": operation,
        "outcome": "failure",
        "identifier_kind": identifier.kind.as_str(),
        "error_code": err.code(),
    });
    if let Error::InvalidIdentifier { codes, .. } = err {
        detail["validation_codes"] = json!(codes);
    }
    detail
}

/// Run CPU-bound crypto on the blocking pool
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Encryption(format!("Task join error: {}", e)))?;
    if let Err(err) = &result {
        debug!(code = err.code(), "Cryptographic operation failed");
    }
    result
}
