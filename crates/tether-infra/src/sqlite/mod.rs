//! SQLite storage layer.
//!
//! Key-value persistence backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod kv;
pub mod pool;

pub use kv::SqliteKvStore;
pub use pool::DatabasePool;
