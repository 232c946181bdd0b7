//! Operation key derivation
//!
//! Per-operation keys come from Argon2id over the version's master material.
//! The Argon2 salt is `SHA-256(label || version || version salt || len(context) || context)`,
//! so the same master material yields unrelated keys for different records
//! and an operation key is never the master secret itself.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::entity::{KEY_SIZE, KeyError, KeyVersion, OperationKey};

const OPERATION_KEY_LABEL: &[u8] = b"carevault/operation-key/v1";

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>, KeyError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| KeyError::Derivation(format!("Invalid Argon2 params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Derive the operation key for `context` under `key`
pub(crate) fn derive_operation_key(
    key: &KeyVersion,
    context: &[u8],
    params: &KdfParams,
) -> Result<OperationKey, KeyError> {
    let mut hasher = Sha256::new();
    hasher.update(OPERATION_KEY_LABEL);
    hasher.update(key.version.to_be_bytes());
    hasher.update(key.salt());
    hasher.update((context.len() as u64).to_be_bytes());
    hasher.update(context);
    let salt = hasher.finalize();

    let mut output = [0u8; KEY_SIZE];
    params
        .argon2()?
        .hash_password_into(key.material().as_bytes(), &salt, &mut output)
        .map_err(|e| KeyError::Derivation(e.to_string()))?;

    let derived = OperationKey::new(output);
    output.zeroize();
    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::entity::MasterKey;
    use chrono::Utc;

    fn fast() -> KdfParams {
        KdfParams::new(64, 1, 1)
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let key = KeyVersion::new(1, MasterKey::generate(), Utc::now());
        let a = derive_operation_key(&key, b"patient-a", &fast()).unwrap();
        let b = derive_operation_key(&key, b"patient-a", &fast()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_context_changes_key() {
        let key = KeyVersion::new(1, MasterKey::generate(), Utc::now());
        let a = derive_operation_key(&key, b"patient-a", &fast()).unwrap();
        let b = derive_operation_key(&key, b"patient-b", &fast()).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_operation_key_differs_from_master() {
        let material = MasterKey::generate();
        let raw = *material.as_bytes();
        let key = KeyVersion::new(1, material, Utc::now());
        let derived = derive_operation_key(&key, b"", &fast()).unwrap();
        assert_ne!(derived.as_bytes(), &raw);
    }

    #[test]
    fn test_same_material_different_salt() {
        let material = MasterKey::generate();
        let a = KeyVersion::new(1, material.clone(), Utc::now());
        let b = KeyVersion::new(1, material, Utc::now());
        let ka = derive_operation_key(&a, b"ctx", &fast()).unwrap();
        let kb = derive_operation_key(&b, b"ctx", &fast()).unwrap();
        assert_ne!(ka.as_bytes(), kb.as_bytes());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let key = KeyVersion::new(1, MasterKey::generate(), Utc::now());
        let result = derive_operation_key(&key, b"ctx", &KdfParams::new(1, 0, 0));
        assert!(matches!(result, Err(KeyError::Derivation(_))));
    }
}
