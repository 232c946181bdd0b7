//! AES-256-GCM envelope cipher

use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Nonce, Tag,
    aead::{AeadInPlace, KeyInit, OsRng},
};
use rand_chacha::rand_core::RngCore;
use zeroize::Zeroizing;

use super::entity::{CipherError, EncryptionEnvelope, NONCE_SIZE, TAG_SIZE, context_digest};
use crate::domain::keys::{KeyStore, OperationKey};

/// Encrypts and decrypts field values under keys derived from a [`KeyStore`]
///
/// Both operations are pure computations until the result is returned, so a
/// caller may drop them at any point without leaving partial state. Neither
/// records audit events; that is the compliance facade's job.
#[derive(Clone)]
pub struct EnvelopeCipher {
    keys: Arc<KeyStore>,
}

impl EnvelopeCipher {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    fn aead(key: &OperationKey) -> Result<Aes256Gcm, CipherError> {
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| CipherError::Encryption(e.to_string()))
    }

    /// Encrypt `plaintext` for `context` under the active key version
    ///
    /// Every call draws a fresh 96-bit nonce from the OS CSPRNG.
    /// Empty plaintext is valid and yields a tag-only envelope.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        context: &[u8],
    ) -> Result<EncryptionEnvelope, CipherError> {
        let key_version = self.keys.current_key_version()?.version;
        let key = self.keys.derive_operation_key(key_version, context)?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let digest = context_digest(context);
        let aad = EncryptionEnvelope::associated_data(key_version, &digest);

        let mut buffer = plaintext.to_vec();
        let tag = Self::aead(&key)?
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), &aad, &mut buffer)
            .map_err(|_| CipherError::Encryption("AES-GCM seal failed".to_string()))?;

        let mut auth_tag = [0u8; TAG_SIZE];
        auth_tag.copy_from_slice(tag.as_slice());

        tracing::trace!(key_version, len = plaintext.len(), "Sealed envelope");
        Ok(EncryptionEnvelope::new(
            key_version,
            nonce,
            buffer,
            auth_tag,
            digest,
        ))
    }

    /// Decrypt `envelope` for `context`
    ///
    /// The context digest is checked before any key derivation, so a wrong
    /// record identity fails fast with `ContextMismatch`. A tag failure is
    /// `Integrity`; no plaintext is ever returned in that case.
    pub fn decrypt(
        &self,
        envelope: &EncryptionEnvelope,
        context: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        let digest = context_digest(context);
        if digest != *envelope.context_digest() {
            return Err(CipherError::ContextMismatch);
        }

        let key = self
            .keys
            .derive_operation_key(envelope.key_version(), context)?;
        let aad = EncryptionEnvelope::associated_data(envelope.key_version(), &digest);

        let mut buffer = Zeroizing::new(envelope.ciphertext().to_vec());
        Self::aead(&key)?
            .decrypt_in_place_detached(
                Nonce::from_slice(envelope.nonce()),
                &aad,
                buffer.as_mut_slice(),
                Tag::from_slice(envelope.auth_tag()),
            )
            .map_err(|_| CipherError::Integrity)?;

        tracing::trace!(key_version = envelope.key_version(), "Opened envelope");
        Ok(buffer)
    }
}
