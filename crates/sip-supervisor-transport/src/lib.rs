//! Transport layer for the supervisor's HTTP surface.
//!
//! Provides:
//! - Wire protocol (JSON request/response bodies)
//! - Axum router and server (feature: http)

pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

pub use protocol::{KeypressRequest, KeypressResponse};

#[cfg(feature = "http")]
pub use http::{AppState, router, serve};
