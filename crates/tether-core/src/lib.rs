//! Core engine for Tether.
//!
//! This crate holds the summary cache, the aggregated session state, the
//! outbound message queue, the shared tick broadcaster, and the per-observer
//! update loop, plus the ports (`ChatBackend`, `KvStore`, `ContentHasher`)
//! that tether-infra implements. It depends only on `tether-types` -- never
//! on `tether-infra` or any HTTP/database crate.

pub mod hash;
pub mod queue;
pub mod remote;
pub mod schedule;
pub mod session;
pub mod state;
pub mod storage;
pub mod summary;
pub mod tick;

#[cfg(test)]
pub(crate) mod test_support;
