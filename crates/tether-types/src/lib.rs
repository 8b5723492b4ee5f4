//! Shared domain types for Tether.
//!
//! Session keys, observed messages, aggregated session state, summary cache
//! entries, outbound queue jobs, remote call outcomes, configuration, and
//! their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod message;
pub mod queue;
pub mod remote;
pub mod session;
pub mod state;
pub mod summary;
