//! Embedding provider adapters
//!
//! The models themselves (CLIP, SIFT, ...) live in a separate inference
//! service; these adapters speak its HTTP API and expose the
//! [`crate::domain::ports::EmbeddingProvider`] port.

pub mod remote;

pub use remote::{RemoteGlobalProvider, RemoteLocalProvider};
