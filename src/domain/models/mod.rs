//! Domain models
//!
//! Pure domain entities for the reverse image search core: model
//! descriptors, keypoint tags for local-feature composite keys, and search
//! results. Framework-agnostic, no infrastructure concerns.

pub mod descriptor;
pub mod keypoint;
pub mod search;

pub use descriptor::{
    MAX_METADATA_LENGTH, MAX_PAGINATION, MAX_URL_LENGTH, Metric, ModelDescriptor, SearchParams,
    VectorIndex, find_model, model_registry,
};
pub use keypoint::{KeypointTag, composite_key, split_composite_key};
pub use search::{SearchHit, similarity_score};
