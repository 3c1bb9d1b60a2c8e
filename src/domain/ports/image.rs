//! Image fetcher port

use async_trait::async_trait;
use image::DynamicImage;

use crate::domain::errors::CommandResult;

/// Trait for loading images by url.
///
/// Implementations fetch the bytes over HTTP(S) following redirects, decode
/// them, reject images smaller than 150 x 150 pixels with a parameter
/// error, and resize images whose larger dimension exceeds 1000 pixels so
/// that it becomes exactly 1000, preserving aspect ratio.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetches and prepares the image at `url`.
    async fn fetch(&self, url: &str) -> CommandResult<DynamicImage>;
}
