//! Envelope entity and its storable byte layout

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::keys::KeyError;

/// Current envelope format version byte
pub const FORMAT_VERSION: u8 = 0x01;

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of the context digest (SHA-256) in bytes
pub const DIGEST_SIZE: usize = 32;

const HEADER_SIZE: usize = 1 + 4 + NONCE_SIZE;

/// Smallest valid encoded envelope (empty ciphertext)
pub const MIN_ENVELOPE_SIZE: usize = HEADER_SIZE + TAG_SIZE + DIGEST_SIZE;

const CONTEXT_DIGEST_LABEL: &[u8] = b"carevault/context-digest/v1";

/// Errors that can occur during envelope operations
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Envelope context does not match the supplied context")]
    ContextMismatch,

    #[error("Authentication failed (invalid key or corrupted data)")]
    Integrity,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unsupported envelope format version {0:#04x}")]
    UnsupportedFormatVersion(u8),

    #[error("Encryption failed: {0}")]
    Encryption(String),
}

/// One-way digest binding an envelope to its record context
pub fn context_digest(context: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(CONTEXT_DIGEST_LABEL);
    hasher.update(context);
    hasher.finalize().into()
}

/// A self-contained, storable unit of encrypted field data
///
/// Immutable once created: fields are read through accessors only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionEnvelope {
    key_version: u32,
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
    auth_tag: [u8; TAG_SIZE],
    context_digest: [u8; DIGEST_SIZE],
}

impl EncryptionEnvelope {
    pub(crate) fn new(
        key_version: u32,
        nonce: [u8; NONCE_SIZE],
        ciphertext: Vec<u8>,
        auth_tag: [u8; TAG_SIZE],
        context_digest: [u8; DIGEST_SIZE],
    ) -> Self {
        Self {
            key_version,
            nonce,
            ciphertext,
            auth_tag,
            context_digest,
        }
    }

    pub fn key_version(&self) -> u32 {
        self.key_version
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn auth_tag(&self) -> &[u8; TAG_SIZE] {
        &self.auth_tag
    }

    pub fn context_digest(&self) -> &[u8; DIGEST_SIZE] {
        &self.context_digest
    }

    /// AEAD associated data: format version, key version, context digest
    pub(crate) fn associated_data(
        key_version: u32,
        context_digest: &[u8; DIGEST_SIZE],
    ) -> [u8; 1 + 4 + DIGEST_SIZE] {
        let mut aad = [0u8; 1 + 4 + DIGEST_SIZE];
        aad[0] = FORMAT_VERSION;
        aad[1..5].copy_from_slice(&key_version.to_be_bytes());
        aad[5..].copy_from_slice(context_digest);
        aad
    }

    /// Encode to the storable wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_ENVELOPE_SIZE + self.ciphertext.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&self.key_version.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.auth_tag);
        out.extend_from_slice(&self.context_digest);
        out
    }

    /// Decode from the storable wire format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() < MIN_ENVELOPE_SIZE {
            return Err(CipherError::MalformedEnvelope(format!(
                "expected at least {} bytes, got {}",
                MIN_ENVELOPE_SIZE,
                bytes.len()
            )));
        }
        if bytes[0] != FORMAT_VERSION {
            return Err(CipherError::UnsupportedFormatVersion(bytes[0]));
        }

        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&bytes[1..5]);

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[5..HEADER_SIZE]);

        let digest_start = bytes.len() - DIGEST_SIZE;
        let tag_start = digest_start - TAG_SIZE;

        let mut auth_tag = [0u8; TAG_SIZE];
        auth_tag.copy_from_slice(&bytes[tag_start..digest_start]);

        let mut context_digest = [0u8; DIGEST_SIZE];
        context_digest.copy_from_slice(&bytes[digest_start..]);

        Ok(Self {
            key_version: u32::from_be_bytes(version_bytes),
            nonce,
            ciphertext: bytes[HEADER_SIZE..tag_start].to_vec(),
            auth_tag,
            context_digest,
        })
    }

    /// Encode as standard base64 (for text columns)
    pub fn to_base64(&self) -> String {
        use base64::{Engine, engine::general_purpose::STANDARD};
        STANDARD.encode(self.to_bytes())
    }

    /// Decode from standard base64
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        use base64::{Engine, engine::general_purpose::STANDARD};
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CipherError::MalformedEnvelope(format!("Invalid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}
