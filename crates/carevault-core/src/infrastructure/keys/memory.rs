//! In-memory key version repository
//!
//! Versions live only as long as the process. Clones share state, so a test
//! can reopen a `KeyStore` over the same repository.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::keys::{KeyError, KeyVersion, KeyVersionRepository};

#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyVersionRepository {
    versions: Arc<Mutex<Vec<KeyVersion>>>,
}

impl InMemoryKeyVersionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.versions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyVersionRepository for InMemoryKeyVersionRepository {
    async fn load_all(&self) -> Result<Vec<KeyVersion>, KeyError> {
        Ok(self
            .versions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn store(&self, key: &KeyVersion) -> Result<(), KeyError> {
        let mut versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        if versions.iter().any(|k| k.version == key.version) {
            return Err(KeyError::Storage(format!(
                "Key version {} already exists",
                key.version
            )));
        }
        versions.push(key.clone());
        Ok(())
    }

    async fn mark_retired(
        &self,
        version: u32,
        retired_at: DateTime<Utc>,
    ) -> Result<(), KeyError> {
        let mut versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        let key = versions
            .iter_mut()
            .find(|k| k.version == version)
            .ok_or(KeyError::VersionNotFound(version))?;
        key.retired_at.get_or_insert(retired_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::MasterKey;

    #[tokio::test]
    async fn test_store_and_load() {
        let repo = InMemoryKeyVersionRepository::new();
        assert!(repo.is_empty());

        let key = KeyVersion::new(1, MasterKey::generate(), Utc::now());
        repo.store(&key).await.unwrap();

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].version, 1);
        assert_eq!(loaded[0].salt(), key.salt());
    }

    #[tokio::test]
    async fn test_duplicate_version_rejected() {
        let repo = InMemoryKeyVersionRepository::new();
        repo.store(&KeyVersion::new(1, MasterKey::generate(), Utc::now()))
            .await
            .unwrap();
        assert!(matches!(
            repo.store(&KeyVersion::new(1, MasterKey::generate(), Utc::now()))
                .await,
            Err(KeyError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_retired_is_idempotent() {
        let repo = InMemoryKeyVersionRepository::new();
        repo.store(&KeyVersion::new(1, MasterKey::generate(), Utc::now()))
            .await
            .unwrap();

        let first = Utc::now();
        repo.mark_retired(1, first).await.unwrap();
        repo.mark_retired(1, first + chrono::Duration::days(1))
            .await
            .unwrap();

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded[0].retired_at, Some(first));

        assert!(matches!(
            repo.mark_retired(9, first).await,
            Err(KeyError::VersionNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let repo = InMemoryKeyVersionRepository::new();
        let clone = repo.clone();
        repo.store(&KeyVersion::new(1, MasterKey::generate(), Utc::now()))
            .await
            .unwrap();
        assert_eq!(clone.len(), 1);
    }
}
