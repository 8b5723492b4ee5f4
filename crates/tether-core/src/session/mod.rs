//! Session orchestration.
//!
//! - `hub` -- `SessionHub`, the container shared by every caller
//! - `update_loop` -- per-observer poll/evaluate/emit loop

pub mod hub;
pub mod update_loop;

pub use hub::SessionHub;
pub use update_loop::UpdateLoop;
