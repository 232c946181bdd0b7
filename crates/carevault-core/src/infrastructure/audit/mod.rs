//! Audit event repositories

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryAuditRepository;
pub use sqlite::SqliteAuditRepository;
