//! Key store repository traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entity::{KeyError, KeyVersion};

/// Durable storage for key versions
///
/// Versions are never deleted through this interface: an envelope may
/// reference any version ever created.
#[async_trait]
pub trait KeyVersionRepository: Send + Sync {
    /// Load every stored version, in any order
    async fn load_all(&self) -> Result<Vec<KeyVersion>, KeyError>;

    /// Persist a newly created version
    async fn store(&self, key: &KeyVersion) -> Result<(), KeyError>;

    /// Record that a version stopped being the active encryption key.
    /// Must be idempotent.
    async fn mark_retired(&self, version: u32, retired_at: DateTime<Utc>)
    -> Result<(), KeyError>;
}
