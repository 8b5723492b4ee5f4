//! Aggregated per-session state.

pub mod store;

pub use store::{AggregatedStateStore, prune_state};
