//! tokensync-storage: `KvStore` backends for TokenSync.
//!
//! Backends:
//! - [`memory`]: in-memory (tests, dry runs; no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (single-file persistence)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
