//! Remote chat server port.
//!
//! - `backend` -- `ChatBackend` trait (RPITIT)
//! - `box_backend` -- `BoxChatBackend` for dynamic dispatch

pub mod backend;
pub mod box_backend;

pub use backend::ChatBackend;
pub use box_backend::BoxChatBackend;
