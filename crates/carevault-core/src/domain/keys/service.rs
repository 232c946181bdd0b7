//! Key store service
//!
//! Manages the versioned key ring and its rotation.

use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::{
    entity::{KeyError, KeyVersion, KeyVersionInfo, MasterKey, OperationKey},
    kdf::{self, KdfParams},
    repository::KeyVersionRepository,
};

/// Immutable snapshot of all known versions, ascending by version.
/// The last entry is the active one.
#[derive(Default)]
struct KeyRing {
    versions: Vec<KeyVersion>,
}

impl KeyRing {
    fn active(&self) -> Option<&KeyVersion> {
        self.versions.last()
    }

    fn get(&self, version: u32) -> Option<&KeyVersion> {
        self.versions
            .binary_search_by_key(&version, |k| k.version)
            .ok()
            .map(|idx| &self.versions[idx])
    }
}

/// Versioned master key store
///
/// # Concurrency
///
/// - `rotate` and the initializers are serialized by an async mutex (single writer)
/// - `current_key_version` and `derive_operation_key` take a snapshot of the
///   ring; a rotation publishes a whole new ring in one pointer swap, so a
///   reader sees either the pre- or post-rotation state
///
/// The store holds no timer. An external scheduler calls `rotate` on its cadence.
pub struct KeyStore {
    repository: Box<dyn KeyVersionRepository>,
    ring: RwLock<Arc<KeyRing>>,
    rotation: tokio::sync::Mutex<()>,
    params: KdfParams,
}

impl KeyStore {
    /// Open a key store over the given repository, loading persisted versions
    pub async fn open(
        repository: Box<dyn KeyVersionRepository>,
        params: KdfParams,
    ) -> Result<Self, KeyError> {
        let mut versions = repository.load_all().await?;
        versions.sort_by_key(|k| k.version);
        if let Some(pair) = versions.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(KeyError::Storage(format!(
                "Duplicate key version {} in repository",
                pair[0].version
            )));
        }

        // A superseded version whose retirement never reached storage is
        // retired as of its successor's creation.
        for idx in 1..versions.len() {
            let successor_created = versions[idx].created_at;
            let previous = &mut versions[idx - 1];
            if previous.retired_at.is_none() {
                tracing::warn!(
                    key_version = previous.version,
                    "Superseded key version was not marked retired; treating it as retired"
                );
                previous.retired_at = Some(successor_created);
            }
        }

        tracing::debug!(versions = versions.len(), "Loaded key ring");

        Ok(Self {
            repository,
            ring: RwLock::new(Arc::new(KeyRing { versions })),
            rotation: tokio::sync::Mutex::new(()),
            params,
        })
    }

    fn snapshot(&self) -> Arc<KeyRing> {
        let guard = self.ring.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn publish(&self, ring: KeyRing) {
        let mut guard = self.ring.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(ring);
    }

    /// The version used for new encryptions
    pub fn current_key_version(&self) -> Result<KeyVersion, KeyError> {
        self.snapshot()
            .active()
            .cloned()
            .ok_or(KeyError::NoActiveKey)
    }

    /// Derive the per-operation key for `context` under `version`
    ///
    /// Works for retired versions as well as the active one.
    pub fn derive_operation_key(
        &self,
        version: u32,
        context: &[u8],
    ) -> Result<OperationKey, KeyError> {
        let ring = self.snapshot();
        let key = ring
            .get(version)
            .ok_or(KeyError::VersionNotFound(version))?;
        kdf::derive_operation_key(key, context, &self.params)
    }

    /// Create version 1 if the store is empty; otherwise return the active version
    pub async fn initialize(&self) -> Result<KeyVersion, KeyError> {
        let _guard = self.rotation.lock().await;
        if let Some(active) = self.snapshot().active() {
            return Ok(active.clone());
        }
        let created = self.install(MasterKey::generate()).await?;
        tracing::info!(key_version = created.version, "Generated initial master key");
        Ok(created)
    }

    /// Seed version 1 from externally supplied master material
    ///
    /// Ignored (with a warning) once the store already has versions.
    pub async fn initialize_with_material(
        &self,
        material: MasterKey,
    ) -> Result<KeyVersion, KeyError> {
        let _guard = self.rotation.lock().await;
        if let Some(active) = self.snapshot().active() {
            tracing::warn!(
                key_version = active.version,
                "Key store already initialized, ignoring supplied master material"
            );
            return Ok(active.clone());
        }
        let created = self.install(material).await?;
        tracing::info!(key_version = created.version, "Installed supplied master key");
        Ok(created)
    }

    /// Generate a new version, make it active, and retire the previous one
    pub async fn rotate(&self) -> Result<KeyVersion, KeyError> {
        let _guard = self.rotation.lock().await;
        let created = self.install(MasterKey::generate()).await?;
        tracing::info!(key_version = created.version, "Rotated master key");
        Ok(created)
    }

    /// Persist and publish a new active version. Caller holds the rotation lock.
    async fn install(&self, material: MasterKey) -> Result<KeyVersion, KeyError> {
        let current = self.snapshot();
        let now = Utc::now();

        let next = match current.active() {
            Some(active) => active.version.checked_add(1).ok_or_else(|| {
                KeyError::Storage("Key version counter exhausted".to_string())
            })?,
            None => 1,
        };

        // Store before retiring: a failed store leaves the previous version
        // active and unretired. A failed retire is repaired by `open`.
        let created = KeyVersion::new(next, material, now);
        self.repository.store(&created).await?;

        if let Some(active) = current.active()
            && let Err(e) = self.repository.mark_retired(active.version, now).await
        {
            tracing::warn!(
                key_version = active.version,
                error = %e,
                "Failed to persist retirement of previous key version"
            );
        }

        let mut versions = current.versions.clone();
        if let Some(previous) = versions.last_mut() {
            previous.retired_at.get_or_insert(now);
        }
        versions.push(created.clone());
        self.publish(KeyRing { versions });

        Ok(created)
    }

    /// List all versions (metadata only)
    pub fn key_versions(&self) -> Vec<KeyVersionInfo> {
        let ring = self.snapshot();
        let active = ring.active().map(|k| k.version);
        ring.versions
            .iter()
            .map(|k| k.info(Some(k.version) == active))
            .collect()
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.params
    }
}
