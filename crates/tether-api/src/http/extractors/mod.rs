//! Request extractors shared by the handlers.

pub mod host;

pub use host::{Host, Target};
