//! Summary cache.

pub mod cache;

pub use cache::{SUMMARY_KEY_PREFIX, SummaryCache};
