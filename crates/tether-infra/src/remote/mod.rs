//! Remote chat server adapter.
//!
//! - `client` -- `HttpChatBackend` (reqwest)
//! - `parse` -- tolerant JSON decoding with named fallback fields

pub mod client;
pub mod parse;

pub use client::HttpChatBackend;
