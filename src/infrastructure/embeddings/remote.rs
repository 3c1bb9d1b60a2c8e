//! HTTP inference providers
//!
//! One adapter per model kind: global models answer a single vector per
//! image (and optionally per text), local-feature models answer a
//! descriptor list ordered by decreasing keypoint response.

use async_trait::async_trait;
use image::DynamicImage;
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;

use crate::domain::errors::{CommandError, CommandResult};
use crate::domain::models::{KeypointTag, ModelDescriptor};
use crate::domain::ports::embedding::{EmbeddingProvider, ImageEmbedding, LocalDescriptor};
use crate::infrastructure::config::EmbeddingServiceConfig;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct DescriptorsResponse {
    descriptors: Vec<DescriptorPayload>,
}

#[derive(Debug, Deserialize)]
struct DescriptorPayload {
    vector: Vec<f32>,
    keypoint: String,
}

fn build_client(config: &EmbeddingServiceConfig) -> CommandResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|err| CommandError::server(format!("Failed to build HTTP client: {err}")))
}

fn encode_png(image: &DynamicImage) -> CommandResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageOutputFormat::Png)
        .map_err(|err| CommandError::server(format!("Failed to encode image: {err}")))?;
    Ok(buffer.into_inner())
}

async fn post_image(
    client: &reqwest::Client,
    url: &str,
    image: &DynamicImage,
) -> CommandResult<reqwest::Response> {
    let response = client
        .post(url)
        .header("Content-Type", "image/png")
        .body(encode_png(image)?)
        .send()
        .await
        .map_err(|err| CommandError::server(format!("Inference request failed: {err}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read response body".to_string());
        return Err(CommandError::server(format!(
            "Inference service returned {status}: {body}"
        )));
    }
    Ok(response)
}

/// Provider for global (single descriptor) models.
pub struct RemoteGlobalProvider {
    descriptor: &'static ModelDescriptor,
    config: EmbeddingServiceConfig,
    client: reqwest::Client,
}

impl RemoteGlobalProvider {
    /// Creates a provider for one global model.
    pub fn new(
        descriptor: &'static ModelDescriptor,
        config: EmbeddingServiceConfig,
    ) -> CommandResult<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            descriptor,
            config,
            client,
        })
    }

    fn endpoint(&self, kind: &str) -> String {
        format!("{}/models/{}/{kind}", self.config.base_url, self.descriptor.name)
    }

    fn check_dimension(&self, vector: &[f32]) -> CommandResult<()> {
        if vector.len() != self.descriptor.dimension {
            return Err(CommandError::server(format!(
                "Inference service returned {} dimensions, expected {}",
                vector.len(),
                self.descriptor.dimension
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteGlobalProvider {
    fn dimension(&self) -> usize {
        self.descriptor.dimension
    }

    fn cardinality(&self) -> usize {
        1
    }

    async fn image_embedding(&self, image: &DynamicImage) -> CommandResult<ImageEmbedding> {
        let response = post_image(&self.client, &self.endpoint("image"), image).await?;
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| CommandError::server(format!("Unreadable inference response: {err}")))?;
        self.check_dimension(&parsed.embedding)?;
        Ok(ImageEmbedding::Global(parsed.embedding))
    }

    async fn text_embedding(&self, text: &str) -> CommandResult<Vec<f32>> {
        if !self.descriptor.supports_text {
            return Err(CommandError::server(
                "Text embeddings are not supported by this model.",
            ));
        }

        let response = self
            .client
            .post(self.endpoint("text"))
            .json(&serde_json::json!({"text": text}))
            .send()
            .await
            .map_err(|err| CommandError::server(format!("Inference request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(CommandError::server(format!(
                "Inference service returned {status}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| CommandError::server(format!("Unreadable inference response: {err}")))?;
        self.check_dimension(&parsed.embedding)?;
        Ok(parsed.embedding)
    }
}

/// Provider for local-feature (multi descriptor) models.
pub struct RemoteLocalProvider {
    descriptor: &'static ModelDescriptor,
    config: EmbeddingServiceConfig,
    client: reqwest::Client,
}

impl RemoteLocalProvider {
    /// Creates a provider for one local-feature model.
    pub fn new(
        descriptor: &'static ModelDescriptor,
        config: EmbeddingServiceConfig,
    ) -> CommandResult<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            descriptor,
            config,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}/descriptors",
            self.config.base_url, self.descriptor.name
        )
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteLocalProvider {
    fn dimension(&self) -> usize {
        self.descriptor.dimension
    }

    fn cardinality(&self) -> usize {
        self.descriptor.cardinality
    }

    async fn image_embedding(&self, image: &DynamicImage) -> CommandResult<ImageEmbedding> {
        let response = post_image(&self.client, &self.endpoint(), image).await?;
        let parsed: DescriptorsResponse = response
            .json()
            .await
            .map_err(|err| CommandError::server(format!("Unreadable inference response: {err}")))?;

        let mut descriptors = Vec::with_capacity(parsed.descriptors.len());
        for payload in parsed.descriptors.into_iter().take(self.descriptor.cardinality) {
            if payload.vector.len() != self.descriptor.dimension {
                return Err(CommandError::server(format!(
                    "Inference service returned {} dimensions, expected {}",
                    payload.vector.len(),
                    self.descriptor.dimension
                )));
            }
            descriptors.push(LocalDescriptor {
                vector: payload.vector,
                tag: KeypointTag::parse(&payload.keypoint)?,
            });
        }
        Ok(ImageEmbedding::Local(descriptors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::find_model;

    fn test_image() -> DynamicImage {
        DynamicImage::new_rgb8(4, 4)
    }

    fn service_config(base_url: String) -> EmbeddingServiceConfig {
        EmbeddingServiceConfig {
            base_url,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_global_image_embedding() {
        let mut server = mockito::Server::new_async().await;
        let embedding: Vec<f32> = vec![0.0; 512];
        let mock = server
            .mock("POST", "/models/vit_b32/image")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::json!({"embedding": embedding}).to_string())
            .create_async()
            .await;

        let provider = RemoteGlobalProvider::new(
            find_model("vit_b32").unwrap(),
            service_config(server.url()),
        )
        .unwrap();

        let result = provider.image_embedding(&test_image()).await.unwrap();
        assert_eq!(result, ImageEmbedding::Global(vec![0.0; 512]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_global_dimension_mismatch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/vit_b32/image")
            .with_status(200)
            .with_body(serde_json::json!({"embedding": [1.0, 2.0]}).to_string())
            .create_async()
            .await;

        let provider = RemoteGlobalProvider::new(
            find_model("vit_b32").unwrap(),
            service_config(server.url()),
        )
        .unwrap();

        let err = provider.image_embedding(&test_image()).await.unwrap_err();
        assert!(err.to_string().contains("expected 512"));
    }

    #[tokio::test]
    async fn test_text_embedding_rejected_for_image_only_model() {
        let provider = RemoteGlobalProvider::new(
            find_model("resnet50").unwrap(),
            service_config("http://unused".to_string()),
        )
        .unwrap();

        let err = provider.text_embedding("cute cat").await.unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[tokio::test]
    async fn test_local_descriptors_parse_and_cap() {
        let mut server = mockito::Server::new_async().await;
        let descriptor = serde_json::json!({
            "vector": vec![0.5f32; 128],
            "keypoint": "256.36_319.86_190.76",
        });
        server
            .mock("POST", "/models/sift100/descriptors")
            .with_status(200)
            .with_body(
                serde_json::json!({"descriptors": vec![descriptor; 150]}).to_string(),
            )
            .create_async()
            .await;

        let provider = RemoteLocalProvider::new(
            find_model("sift100").unwrap(),
            service_config(server.url()),
        )
        .unwrap();

        let ImageEmbedding::Local(descriptors) =
            provider.image_embedding(&test_image()).await.unwrap()
        else {
            panic!("expected local descriptors");
        };
        assert_eq!(descriptors.len(), 100);
        assert_eq!(descriptors[0].tag.position(), [256.36, 319.86]);
    }

    #[tokio::test]
    async fn test_upstream_error_is_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/vit_b32/image")
            .with_status(500)
            .with_body("inference exploded")
            .create_async()
            .await;

        let provider = RemoteGlobalProvider::new(
            find_model("vit_b32").unwrap(),
            service_config(server.url()),
        )
        .unwrap();

        let err = provider.image_embedding(&test_image()).await.unwrap_err();
        assert!(!err.is_parameter());
        assert!(err.to_string().contains("500"));
    }
}
