//! Key store domain module
//!
//! Holds versioned master key material and performs rotation.
//!
//! # Architecture
//!
//! - **Entities**: `MasterKey`, `KeyVersion`, `OperationKey`, `KdfParams`
//! - **Repository Traits**: `KeyVersionRepository`
//! - **Services**: `KeyStore`
//!
//! # Security Features
//!
//! - Exactly one active version; older versions stay decrypt-capable after retirement
//! - Per-operation keys derived with Argon2id, salted per version and per context
//! - Master material and derived keys are zeroized on drop and redacted in debug output
//! - The active version is published as an immutable snapshot swapped under a lock,
//!   so readers never observe a half-finished rotation
//!
//! # Example
//!
//! ```ignore
//! use carevault_core::domain::keys::{KdfParams, KeyStore};
//! use carevault_core::infrastructure::keys::InMemoryKeyVersionRepository;
//!
//! let store = KeyStore::open(
//!     Box::new(InMemoryKeyVersionRepository::new()),
//!     KdfParams::default(),
//! )
//! .await?;
//! store.initialize().await?;
//!
//! let active = store.current_key_version()?;
//! let key = store.derive_operation_key(active.version, b"record-context")?;
//! ```

pub mod entity;
pub mod kdf;
pub mod repository;
pub mod service;

pub use entity::{KeyError, KeyVersion, KeyVersionInfo, MasterKey, OperationKey};
pub use kdf::KdfParams;
pub use repository::KeyVersionRepository;
pub use service::KeyStore;
