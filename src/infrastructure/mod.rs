//! Infrastructure layer
//!
//! Contains adapters and implementations for external dependencies:
//! - Configuration loading (figment: defaults, yaml, environment)
//! - Logging and tracing setup
//! - AMQP work queue dispatcher (client and worker)
//! - Milvus vector store adapter (plus an in-memory stand-in)
//! - HTTP-backed embedding providers and the image fetcher
//! - The axum HTTP front-end

pub mod amqp;
pub mod config;
pub mod embeddings;
pub mod http;
pub mod image;
pub mod logging;
pub mod milvus;
