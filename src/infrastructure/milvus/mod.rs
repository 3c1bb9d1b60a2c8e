//! Vector store adapters
//!
//! The Milvus adapter speaks the v2 REST API with strongly consistent
//! reads; the in-memory adapter mirrors its observable semantics for tests
//! and local development.

pub mod client;
pub mod collection;
pub mod memory;

pub use client::MilvusClient;
pub use collection::MilvusCollection;
pub use memory::InMemoryCollection;
