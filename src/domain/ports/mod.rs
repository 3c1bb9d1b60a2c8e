//! Ports (trait interfaces) implemented by the infrastructure layer
//!
//! The command layer depends only on these traits; adapters for the vector
//! store, the embedding inference services, the image fetcher, and the work
//! queue live under `infrastructure`.

pub mod dispatcher;
pub mod embedding;
pub mod image;
pub mod vector_store;

pub use dispatcher::Dispatcher;
pub use embedding::{EmbeddingProvider, ImageEmbedding, LocalDescriptor};
pub use image::ImageFetcher;
pub use vector_store::{QueryExpr, QueryRow, SearchMatch, VectorCollection, VectorRecord};
