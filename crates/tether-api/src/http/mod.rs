//! HTTP/REST API layer for Tether.
//!
//! Axum-based REST API at `/api/v1/` with a per-host IP allow-list,
//! envelope response format, SSE snapshot streams, and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
