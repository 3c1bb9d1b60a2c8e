//! HTTP front-end
//!
//! A thin axum layer: every business call is validated, dispatched onto the
//! work queue with a fresh client connection, and mapped to an HTTP status.

pub mod error;
pub mod handlers;
pub mod schemas;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, build_router, serve};
