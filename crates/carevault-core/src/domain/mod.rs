//! Domain layer
//!
//! Components, leaf-first:
//!
//! - `keys`: versioned master key material and rotation
//! - `envelope`: authenticated field encryption bound to a record context
//! - `identifiers`: checksum and structure validation, pure and stateless
//! - `audit`: append-only, retention-enforced event ledger
//! - `compliance`: the facade composing the four components above

pub mod audit;
pub mod compliance;
pub mod envelope;
pub mod identifiers;
pub mod keys;
