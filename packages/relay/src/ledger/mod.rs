//! Idempotency ledger implementations.
//!
//! Available backends:
//! - `SqliteLedger` - SQLite file, used in production
//! - `MemoryLedger` - in-memory set for tests and dry runs

pub mod memory;
pub mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
