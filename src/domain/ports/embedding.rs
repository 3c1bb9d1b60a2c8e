//! Embedding provider port
//!
//! One provider exists per model. Global models produce a single descriptor
//! per image; local-feature models produce an ordered sequence of
//! descriptors anchored to keypoints.

use async_trait::async_trait;
use image::DynamicImage;

use crate::domain::errors::{CommandError, CommandResult};
use crate::domain::models::KeypointTag;

/// One local descriptor with its keypoint location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDescriptor {
    /// The descriptor vector, of the model's dimension.
    pub vector: Vec<f32>,
    /// Keypoint position and orientation.
    pub tag: KeypointTag,
}

/// The embedding of one image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageEmbedding {
    /// A single global descriptor (cardinality 1).
    Global(Vec<f32>),
    /// Local descriptors in decreasing keypoint response, at most the
    /// model's cardinality. An image may yield fewer.
    Local(Vec<LocalDescriptor>),
}

/// Trait for embedding providers.
///
/// A provider instance is shared across a worker's sequential calls and
/// must not mutate internal state between calls.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embedding dimension of this model.
    fn dimension(&self) -> usize;

    /// Maximum number of descriptors per image; 1 for global models.
    fn cardinality(&self) -> usize;

    /// Computes the embedding of an already loaded image.
    async fn image_embedding(&self, image: &DynamicImage) -> CommandResult<ImageEmbedding>;

    /// Computes the embedding of a text query.
    ///
    /// # Errors
    ///
    /// The default implementation fails: most models cannot embed text.
    async fn text_embedding(&self, _text: &str) -> CommandResult<Vec<f32>> {
        Err(CommandError::server(
            "Text embeddings are not supported by this model.",
        ))
    }
}
