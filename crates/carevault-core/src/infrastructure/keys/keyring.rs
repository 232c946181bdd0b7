//! OS keyring integration for versioned master keys
//!
//! Stores each key version in the operating system's credential store
//! (macOS Keychain, Windows Credential Manager, Linux Secret Service).
//!
//! # Layout
//!
//! - `key-index`: JSON array of stored version numbers
//! - `key-v{n}`: JSON record for version `n` (hex material, hex salt, timestamps)
//!
//! A version entry is always written before the index names it, so a crash
//! between the two leaves an orphan entry rather than a dangling index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::domain::keys::{KeyError, KeyVersion, KeyVersionRepository, MasterKey};
use crate::domain::keys::entity::SALT_SIZE;

/// Service name used for keyring storage
pub const DEFAULT_KEYRING_SERVICE: &str = "carevault";

const INDEX_ENTRY: &str = "key-index";

#[derive(Serialize, Deserialize)]
struct StoredKeyVersion {
    version: u32,
    material: String,
    salt: String,
    created_at: DateTime<Utc>,
    retired_at: Option<DateTime<Utc>>,
}

impl StoredKeyVersion {
    fn from_key(key: &KeyVersion) -> Self {
        Self {
            version: key.version,
            material: key.material().to_hex(),
            salt: hex::encode(key.salt()),
            created_at: key.created_at,
            retired_at: key.retired_at,
        }
    }

    fn into_key(self) -> Result<KeyVersion, KeyError> {
        let material = MasterKey::from_hex(&self.material)?;
        let salt_bytes =
            hex::decode(&self.salt).map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
        let salt: [u8; SALT_SIZE] = salt_bytes.as_slice().try_into().map_err(|_| {
            KeyError::InvalidFormat(format!(
                "Salt for key version {} has {} bytes",
                self.version,
                salt_bytes.len()
            ))
        })?;
        Ok(KeyVersion::restore(
            self.version,
            material,
            salt,
            self.created_at,
            self.retired_at,
        ))
    }
}

impl Drop for StoredKeyVersion {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.material.zeroize();
    }
}

/// OS keyring-based key version repository
///
/// Keyring calls are blocking, so each one runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringKeyVersionRepository {
    service: String,
}

impl Default for KeyringKeyVersionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringKeyVersionRepository {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_KEYRING_SERVICE)
    }

    /// Use a custom service name (tests, multiple deployments on one host)
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, user: &str) -> Result<Entry, KeyError> {
        Entry::new(&self.service, user)
            .map_err(|e| KeyError::Storage(format!("Failed to create keyring entry: {}", e)))
    }

    fn version_user(version: u32) -> String {
        format!("key-v{}", version)
    }

    async fn read(&self, user: &str) -> Result<Option<Zeroizing<String>>, KeyError> {
        let entry = self.entry(user)?;
        let result = tokio::task::spawn_blocking(move || entry.get_password())
            .await
            .map_err(|e| KeyError::Storage(format!("Task join error: {}", e)))?;

        match result {
            Ok(value) => Ok(Some(Zeroizing::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeyError::Storage(format!(
                "Failed to read keyring entry {}: {}",
                user, e
            ))),
        }
    }

    async fn write(&self, user: &str, value: Zeroizing<String>) -> Result<(), KeyError> {
        let entry = self.entry(user)?;
        let name = user.to_string();
        tokio::task::spawn_blocking(move || {
            entry.set_password(&value).map_err(|e| {
                KeyError::Storage(format!("Failed to write keyring entry {}: {}", name, e))
            })
        })
        .await
        .map_err(|e| KeyError::Storage(format!("Task join error: {}", e)))?
    }

    async fn read_index(&self) -> Result<Vec<u32>, KeyError> {
        match self.read(INDEX_ENTRY).await? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| KeyError::InvalidFormat(format!("Corrupt key index: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    async fn read_version(&self, version: u32) -> Result<StoredKeyVersion, KeyError> {
        let json = self
            .read(&Self::version_user(version))
            .await?
            .ok_or(KeyError::VersionNotFound(version))?;
        serde_json::from_str(&json).map_err(|e| {
            KeyError::InvalidFormat(format!("Corrupt record for key version {}: {}", version, e))
        })
    }

    async fn write_version(&self, stored: &StoredKeyVersion) -> Result<(), KeyError> {
        let json = serde_json::to_string(stored)
            .map_err(|e| KeyError::Storage(format!("Failed to serialize key version: {}", e)))?;
        self.write(&Self::version_user(stored.version), Zeroizing::new(json))
            .await
    }
}

#[async_trait]
impl KeyVersionRepository for KeyringKeyVersionRepository {
    async fn load_all(&self) -> Result<Vec<KeyVersion>, KeyError> {
        let mut versions = Vec::new();
        for version in self.read_index().await? {
            versions.push(self.read_version(version).await?.into_key()?);
        }
        Ok(versions)
    }

    async fn store(&self, key: &KeyVersion) -> Result<(), KeyError> {
        let mut index = self.read_index().await?;
        if index.contains(&key.version) {
            return Err(KeyError::Storage(format!(
                "Key version {} already exists",
                key.version
            )));
        }

        self.write_version(&StoredKeyVersion::from_key(key)).await?;

        index.push(key.version);
        let json = serde_json::to_string(&index)
            .map_err(|e| KeyError::Storage(format!("Failed to serialize key index: {}", e)))?;
        self.write(INDEX_ENTRY, Zeroizing::new(json)).await?;

        tracing::debug!(key_version = key.version, "Stored key version in keyring");
        Ok(())
    }

    async fn mark_retired(
        &self,
        version: u32,
        retired_at: DateTime<Utc>,
    ) -> Result<(), KeyError> {
        let mut stored = self.read_version(version).await?;
        if stored.retired_at.is_some() {
            return Ok(());
        }
        stored.retired_at = Some(retired_at);
        self.write_version(&stored).await
    }
}
