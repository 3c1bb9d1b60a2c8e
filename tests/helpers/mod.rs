//! Shared test fixtures: stub providers, a stub fetcher, and service
//! builders over the in-memory collection.
#![allow(dead_code)]

use async_trait::async_trait;
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::Arc;

use idios::domain::errors::{CommandError, CommandResult};
use idios::domain::models::{KeypointTag, Metric, ModelDescriptor, find_model};
use idios::domain::ports::embedding::{EmbeddingProvider, ImageEmbedding, LocalDescriptor};
use idios::domain::ports::ImageFetcher;
use idios::infrastructure::milvus::InMemoryCollection;
use idios::services::commands::{CommandService, ModelRuntime};

/// Fetcher answering a fixed-size image for every url, with opt-in
/// per-url failures.
pub struct StubFetcher {
    failures: HashMap<String, CommandError>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
        }
    }

    /// Makes `url` fail with the given error.
    pub fn failing(mut self, url: &str, error: CommandError) -> Self {
        self.failures.insert(url.to_string(), error);
        self
    }
}

#[async_trait]
impl ImageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> CommandResult<DynamicImage> {
        if let Some(error) = self.failures.get(url) {
            return Err(error.clone());
        }
        Ok(DynamicImage::new_rgb8(512, 512))
    }
}

/// Global provider answering one fixed vector for every image.
pub struct StubGlobalProvider {
    pub dimension: usize,
    pub vector: Vec<f32>,
    pub text_vector: Option<Vec<f32>>,
}

impl StubGlobalProvider {
    pub fn constant(dimension: usize, vector: Vec<f32>) -> Self {
        Self {
            dimension,
            vector,
            text_vector: None,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StubGlobalProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn cardinality(&self) -> usize {
        1
    }

    async fn image_embedding(&self, _image: &DynamicImage) -> CommandResult<ImageEmbedding> {
        Ok(ImageEmbedding::Global(self.vector.clone()))
    }

    async fn text_embedding(&self, _text: &str) -> CommandResult<Vec<f32>> {
        self.text_vector.clone().ok_or_else(|| {
            CommandError::server("Text embeddings are not supported by this model.")
        })
    }
}

/// Local provider answering a fixed descriptor set for every image.
pub struct StubLocalProvider {
    pub dimension: usize,
    pub cardinality: usize,
    pub descriptors: Vec<LocalDescriptor>,
}

#[async_trait]
impl EmbeddingProvider for StubLocalProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn cardinality(&self) -> usize {
        self.cardinality
    }

    async fn image_embedding(&self, _image: &DynamicImage) -> CommandResult<ImageEmbedding> {
        Ok(ImageEmbedding::Local(self.descriptors.clone()))
    }
}

/// A descriptor set forming a well-conditioned square plus interior points.
/// Vectors are mutually distant so nearest-neighbour matches are exact.
pub fn grid_descriptors(dimension: usize) -> Vec<LocalDescriptor> {
    let positions = [
        [0.0, 0.0],
        [100.0, 0.0],
        [100.0, 100.0],
        [0.0, 100.0],
        [50.0, 25.0],
        [25.0, 75.0],
    ];
    positions
        .iter()
        .enumerate()
        .map(|(i, [x, y])| {
            let mut vector = vec![0.0f32; dimension];
            vector[i] = 1.0;
            LocalDescriptor {
                vector,
                tag: KeypointTag::new(*x, *y, 90.0),
            }
        })
        .collect()
}

/// Builds a command service hosting one global model over an in-memory
/// collection, returning the collection handle for direct inspection.
pub fn global_service(
    model: &str,
    provider: StubGlobalProvider,
    fetcher: StubFetcher,
) -> (CommandService, Arc<InMemoryCollection>) {
    let descriptor: &'static ModelDescriptor = find_model(model).expect("model registered");
    let collection = Arc::new(InMemoryCollection::new(Metric::L2));
    let shared: Arc<dyn idios::domain::ports::VectorCollection> = collection.clone();
    let runtime = ModelRuntime {
        descriptor,
        provider: Arc::new(provider),
        collection: shared,
    };
    let service = CommandService::new(vec![runtime], Arc::new(fetcher));
    (service, collection)
}

/// Builds a command service hosting the local-feature model.
pub fn local_service(
    provider: StubLocalProvider,
    fetcher: StubFetcher,
) -> (CommandService, Arc<InMemoryCollection>) {
    let descriptor: &'static ModelDescriptor = find_model("sift100").expect("model registered");
    let collection = Arc::new(InMemoryCollection::new(Metric::L2));
    let shared: Arc<dyn idios::domain::ports::VectorCollection> = collection.clone();
    let runtime = ModelRuntime {
        descriptor,
        provider: Arc::new(provider),
        collection: shared,
    };
    let service = CommandService::new(vec![runtime], Arc::new(fetcher));
    (service, collection)
}
