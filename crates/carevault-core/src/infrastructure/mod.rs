//! Infrastructure layer
//!
//! Repository implementations backed by the OS keyring, SQLite, or memory.

pub mod audit;
pub mod keys;
