//! HTTP image fetcher
//!
//! Fetches image bytes by url (following redirects, as museum and IIIF
//! permalinks frequently answer 303), decodes them, rejects images below
//! the minimum size, and caps the maximum dimension at 1000 pixels with an
//! aspect-preserving resize.

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use std::time::Duration;

use crate::domain::errors::{CommandError, CommandResult};
use crate::domain::ports::ImageFetcher;

/// Minimum acceptable width and height.
const MIN_SIZE: u32 = 150;

/// Maximum dimension after which images are resized down.
const MAX_SIZE: u32 = 1000;

/// Error message for undersized images.
pub const IMAGE_TOO_SMALL: &str = "Images must have their dimensions above 150 x 150 pixels";

/// Fetcher backed by a shared reqwest client.
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    /// Creates a fetcher with a 30 second request timeout.
    pub fn new() -> CommandResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| CommandError::server(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

/// Validates dimensions and applies the size cap.
pub fn prepare(image: DynamicImage) -> CommandResult<DynamicImage> {
    let (width, height) = image.dimensions();
    if width.min(height) < MIN_SIZE {
        return Err(CommandError::parameter(IMAGE_TOO_SMALL));
    }
    if width.max(height) > MAX_SIZE {
        return Ok(image.thumbnail(MAX_SIZE, MAX_SIZE));
    }
    Ok(image)
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> CommandResult<DynamicImage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| CommandError::server(format!("Could not fetch {url}: {err}")))?;

        if !response.status().is_success() {
            return Err(CommandError::server(format!(
                "Could not fetch {url}: status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| CommandError::server(format!("Could not read {url}: {err}")))?;

        let decoded = image::load_from_memory(&bytes)
            .map_err(|err| CommandError::server(format!("Could not decode {url}: {err}")))?;

        prepare(decoded)
    }
}
