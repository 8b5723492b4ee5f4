//! Infrastructure layer for Tether.
//!
//! Contains implementations of the ports defined in `tether-core`: the HTTP
//! chat server client, SQLite key-value storage, SHA-256 content hashing, and
//! the `config.toml` loader.

pub mod config;
pub mod crypto;
pub mod remote;
pub mod sqlite;
