//! Wiring from configuration to a ready `ComplianceFacade`

use std::sync::Arc;

use anyhow::Context;

use crate::config::{Config, KeySource};
use crate::domain::audit::AuditLedger;
use crate::domain::compliance::ComplianceFacade;
use crate::domain::identifiers::IdentifierValidator;
use crate::domain::keys::{KeyStore, KeyVersionRepository};
use crate::infrastructure::audit::SqliteAuditRepository;
use crate::infrastructure::keys::{InMemoryKeyVersionRepository, KeyringKeyVersionRepository};
use crate::storage::Database;

/// Open the key store and ledger described by `config` and compose the facade
///
/// Seeds key version 1 from `CAREVAULT_MASTER_KEY` when the store is empty,
/// or generates fresh material if that variable is unset.
pub async fn open_facade(config: &Config) -> anyhow::Result<ComplianceFacade> {
    let repository: Box<dyn KeyVersionRepository> = match config.keys.source {
        KeySource::Keyring => Box::new(KeyringKeyVersionRepository::with_service(
            &config.keys.keyring_service,
        )),
        KeySource::Memory => {
            tracing::warn!("Using in-memory key storage; keys will not survive restart");
            Box::new(InMemoryKeyVersionRepository::new())
        }
    };
    open_facade_with(config, repository).await
}

/// Like [`open_facade`], with a caller-supplied key version repository
pub async fn open_facade_with(
    config: &Config,
    key_repository: Box<dyn KeyVersionRepository>,
) -> anyhow::Result<ComplianceFacade> {
    config.validate()?;

    let keys = KeyStore::open(key_repository, config.kdf_params())
        .await
        .context("Failed to open key store")?;
    let active = match config.master_key_material()? {
        Some(material) => keys.initialize_with_material(material).await,
        None => keys.initialize().await,
    }
    .context("Failed to initialize key store")?;

    let db = Database::new(config.database_config()).await?;
    let ledger = AuditLedger::new(Arc::new(SqliteAuditRepository::new(db.pool().clone())))
        .with_retention_years(config.ledger.retention_years)
        .with_page_size(config.ledger.page_size);
    ledger.resume().await.context("Failed to read audit ledger")?;

    tracing::info!(
        key_version = active.version,
        ledger = %db.path().display(),
        "Compliance core ready"
    );

    Ok(
        ComplianceFacade::new(IdentifierValidator::default(), Arc::new(keys), Arc::new(ledger))
            .with_retry_policy(config.retry_policy()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::{AuditCategory, AuditFilter};
    use crate::domain::identifiers::HealthcareIdentifier;

    fn memory_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.keys.source = KeySource::Memory;
        config.ledger.path = Some(dir.join("ledger.db"));
        config
    }

    #[tokio::test]
    async fn test_open_facade_in_memory_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = memory_config(dir.path());

        let facade = open_facade(&config).await.unwrap();
        assert_eq!(facade.key_versions().len(), 1);
        assert!(dir.path().join("ledger.db").exists());

        let id = HealthcareIdentifier::national("9434765919");
        let envelope = facade.protect_field(b"note", &id).await.unwrap();
        assert_eq!(facade.reveal_field(&envelope, &id).await.unwrap().as_slice(), b"note");

        let events = facade
            .audit_events(AuditFilter::new().category(AuditCategory::Encryption))
            .collect()
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = memory_config(dir.path());
        config.ledger.retention_years = 3;
        assert!(open_facade(&config).await.is_err());
    }
}
