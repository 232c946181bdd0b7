//! Key store entities

use aes_gcm::aead::OsRng;
use chrono::{DateTime, Utc};
use rand_chacha::rand_core::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of master key material and derived AES-256 keys in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the per-version KDF salt in bytes
pub const SALT_SIZE: usize = 16;

/// Errors that can occur during key operations
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("No active key version: the key store has not been initialized")]
    NoActiveKey,

    #[error("Key version {0} not found")]
    VersionNotFound(u32),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid key format: {0}")]
    InvalidFormat(String),

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Key storage error: {0}")]
    Storage(String),
}

/// Master key material that is securely zeroed on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Generate new random master key material
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a master key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_SIZE {
            return Err(KeyError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Create a master key from a hex-encoded string
    pub fn from_hex(encoded: &str) -> Result<Self, KeyError> {
        let mut bytes =
            hex::decode(encoded.trim()).map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Create a master key from a base64-encoded string
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        use base64::{Engine, engine::general_purpose::STANDARD};
        let mut bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Export key as hex string (for storage in the OS keyring)
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// One generation of master key material
///
/// Created by rotation and never mutated afterwards, except that the
/// previous active version gets `retired_at` set when it is superseded.
/// A retired version can no longer encrypt but always decrypts.
#[derive(Clone)]
pub struct KeyVersion {
    /// Monotonic version number, starting at 1
    pub version: u32,
    material: MasterKey,
    salt: [u8; SALT_SIZE],
    /// When this version was created
    pub created_at: DateTime<Utc>,
    /// When this version stopped being the active encryption key
    pub retired_at: Option<DateTime<Utc>>,
}

impl KeyVersion {
    /// Create a fresh version with a random KDF salt
    pub fn new(version: u32, material: MasterKey, created_at: DateTime<Utc>) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        Self {
            version,
            material,
            salt,
            created_at,
            retired_at: None,
        }
    }

    /// Rebuild a version from persisted parts
    pub fn restore(
        version: u32,
        material: MasterKey,
        salt: [u8; SALT_SIZE],
        created_at: DateTime<Utc>,
        retired_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            version,
            material,
            salt,
            created_at,
            retired_at,
        }
    }

    /// Whether this version has been superseded by a rotation
    pub fn is_retired(&self) -> bool {
        self.retired_at.is_some()
    }

    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }

    pub(crate) fn material(&self) -> &MasterKey {
        &self.material
    }

    /// Metadata view without key material
    pub fn info(&self, active: bool) -> KeyVersionInfo {
        KeyVersionInfo {
            version: self.version,
            created_at: self.created_at,
            retired_at: self.retired_at,
            active,
        }
    }
}

impl std::fmt::Debug for KeyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVersion")
            .field("version", &self.version)
            .field("material", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("retired_at", &self.retired_at)
            .finish()
    }
}

/// Information about a key version (without the material)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVersionInfo {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
    /// Whether new encryptions use this version
    pub active: bool,
}

/// A derived per-operation AES-256 key, zeroized on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct OperationKey {
    bytes: [u8; KEY_SIZE],
}

impl OperationKey {
    pub(crate) fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for OperationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_generation() {
        let key1 = MasterKey::generate();
        let key2 = MasterKey::generate();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
        assert_eq!(key1.as_bytes().len(), KEY_SIZE);
    }

    #[test]
    fn test_master_key_invalid_length() {
        let result = MasterKey::from_bytes(&[7u8; 16]);
        assert!(matches!(
            result,
            Err(KeyError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_master_key_hex_roundtrip() {
        let key = MasterKey::generate();
        let restored = MasterKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key.as_bytes(), restored.as_bytes());
    }

    #[test]
    fn test_master_key_from_base64() {
        use base64::{Engine, engine::general_purpose::STANDARD};
        let encoded = STANDARD.encode([42u8; KEY_SIZE]);
        let key = MasterKey::from_base64(&encoded).unwrap();
        assert_eq!(key.as_bytes(), &[42u8; KEY_SIZE]);

        assert!(matches!(
            MasterKey::from_base64("not base64!"),
            Err(KeyError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let version = KeyVersion::new(1, MasterKey::from_bytes(&[9u8; KEY_SIZE]).unwrap(), Utc::now());
        let debug = format!("{:?}", version);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("9, 9, 9"));

        let op = OperationKey::new([1u8; KEY_SIZE]);
        assert!(format!("{:?}", op).contains("[REDACTED]"));
    }

    #[test]
    fn test_new_versions_get_distinct_salts() {
        let a = KeyVersion::new(1, MasterKey::generate(), Utc::now());
        let b = KeyVersion::new(2, MasterKey::generate(), Utc::now());
        assert_ne!(a.salt(), b.salt());
        assert!(!a.is_retired());
    }

    #[test]
    fn test_info_has_no_material() {
        let version = KeyVersion::new(3, MasterKey::generate(), Utc::now());
        let info = version.info(true);
        assert_eq!(info.version, 3);
        assert!(info.active);
        assert!(info.retired_at.is_none());
    }
}
