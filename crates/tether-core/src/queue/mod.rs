//! Outbound message delivery.

pub mod outbound;

pub use outbound::OutboundQueue;
