//! Envelope encryption domain module
//!
//! Authenticated encryption of individual field values, bound to a
//! caller-supplied record context.
//!
//! # Wire format
//!
//! ```text
//! [1 byte format version][4 bytes key_version, BE][12 bytes nonce]
//! [ciphertext ...][16 bytes auth tag][32 bytes context digest]
//! ```
//!
//! The format version, key version, and context digest are also fed to
//! AES-256-GCM as associated data, so editing any header byte fails the tag.

pub mod cipher;
pub mod entity;

pub use cipher::EnvelopeCipher;
pub use entity::{
    CipherError, DIGEST_SIZE, EncryptionEnvelope, FORMAT_VERSION, MIN_ENVELOPE_SIZE, NONCE_SIZE,
    TAG_SIZE, context_digest,
};
