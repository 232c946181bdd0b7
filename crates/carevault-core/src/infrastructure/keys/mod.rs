//! Key version repositories

pub mod keyring;
pub mod memory;

pub use keyring::KeyringKeyVersionRepository;
pub use memory::InMemoryKeyVersionRepository;
