//! Idios - Reverse Image Search Service
//!
//! A reverse image search system with:
//! - Per-model vector collections (one embedding model per index)
//! - Global descriptors (CLIP-style) and local descriptors (SIFT-style)
//!   with geometric verification of candidate matches
//! - An AMQP work queue decoupling the stateless HTTP front-end from
//!   stateful embedding workers
//! - A Milvus-backed vector store adapter with strongly consistent reads

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{CommandError, CommandResult, RpcError, RpcErrorKind};
pub use domain::models::{Metric, ModelDescriptor, SearchHit};
pub use domain::ports::{Dispatcher, EmbeddingProvider, ImageFetcher, VectorCollection};
pub use services::commands::CommandService;
