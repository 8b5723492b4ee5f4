//! Shared tick timer.

pub mod broadcaster;

pub use broadcaster::{TickBroadcaster, TickListener, TickSubscription};
