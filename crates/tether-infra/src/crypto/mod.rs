//! Cryptographic primitives for Tether.
//!
//! - `hash`: SHA-256 content hashing for summary fingerprints

pub mod hash;
