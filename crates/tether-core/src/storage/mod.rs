//! Storage abstractions for Tether.
//!
//! Defines the key-value store trait used to persist summaries.
//! The SQLite implementation lives in tether-infra.

pub mod box_kv;
pub mod kv_store;
pub mod memory;

pub use box_kv::BoxKvStore;
pub use kv_store::KvStore;
pub use memory::MemoryKvStore;
