//! Request bodies and input validation
//!
//! Validation happens before anything reaches the work queue: url shape and
//! length, metadata size, limit bounds, and model names.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::models::descriptor::{MAX_METADATA_LENGTH, MAX_PAGINATION, MAX_URL_LENGTH};
use crate::domain::models::find_model;
use crate::infrastructure::http::error::FieldError;

/// Body of `add`, `search_add`, and each `add_bulk` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageAndMetadata {
    /// Url of the image; doubles as the primary key.
    pub url: String,
    /// Arbitrary JSON metadata to attach to the image.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Body of `restore`: a dumped entry with its embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct RestoreEntry {
    /// Primary key (possibly a composite key for local-feature dumps).
    pub url: String,
    /// Metadata of the entry.
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Embedding vector; empty means recompute.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// Body of `search`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchRequest {
    /// Query image url.
    #[serde(default)]
    pub url: Option<String>,
    /// Query text (models with text support only).
    #[serde(default)]
    pub text: Option<String>,
    /// Maximum number of results.
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Body of `compare`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompareRequest {
    /// First image url.
    pub url: String,
    /// Second image url.
    pub other: String,
}

/// Body of `urls` and `dump`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PageRequest {
    /// Pagination cursor (strictly greater-than).
    #[serde(default)]
    pub cursor: Option<String>,
    /// Page size.
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Body of `remove`.
#[derive(Debug, Clone, Deserialize)]
pub struct SingleImage {
    /// Url of the image to remove.
    pub url: String,
}

/// Query string of `ping`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PingParams {
    /// When truthy, round-trip the ping through the work queue.
    #[serde(default)]
    pub rpc: Option<String>,
}

impl PingParams {
    /// Whether the rpc round-trip was requested.
    #[must_use]
    pub fn rpc_requested(&self) -> bool {
        self.rpc
            .as_deref()
            .is_some_and(|flag| matches!(flag, "1" | "true" | "True"))
    }
}

/// Validates that a model name is registered.
pub fn validate_model(name: &str) -> Result<(), FieldError> {
    if find_model(name).is_none() {
        return Err(FieldError::new(
            &["path", "model"],
            format!("unknown model '{name}'"),
            "value_error.model",
        ));
    }
    Ok(())
}

/// Validates an absolute http(s) url with a host and TLD, bounded in length.
pub fn validate_url(raw: &str, loc: &[&str]) -> Result<(), FieldError> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(FieldError::new(
            loc,
            format!("URL too long ({} > {MAX_URL_LENGTH})", raw.len()),
            "value_error.url.length",
        ));
    }

    let Ok(parsed) = url::Url::parse(raw) else {
        return Err(FieldError::new(
            loc,
            "invalid or missing URL scheme",
            "value_error.url.scheme",
        ));
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FieldError::new(
            loc,
            "invalid or missing URL scheme",
            "value_error.url.scheme",
        ));
    }

    let host_has_tld = parsed
        .host_str()
        .is_some_and(|host| host.contains('.') && !host.ends_with('.'));
    if !host_has_tld {
        return Err(FieldError::new(
            loc,
            "URL host invalid, top level domain required",
            "value_error.url.host",
        ));
    }

    Ok(())
}

/// Validates that metadata serialises within the storage bound.
pub fn validate_metadata(metadata: Option<&Value>, loc: &[&str]) -> Result<(), FieldError> {
    let serialized = serde_json::to_string(&metadata.unwrap_or(&Value::Null)).unwrap_or_default();
    if serialized.len() > MAX_METADATA_LENGTH {
        return Err(FieldError::new(
            loc,
            format!(
                "metadata json too long ({} > {MAX_METADATA_LENGTH})",
                serialized.len()
            ),
            "value_error.metadata_json_too_long",
        ));
    }
    Ok(())
}

/// Validates a page or search limit.
pub fn validate_limit(limit: Option<u64>, loc: &[&str]) -> Result<(), FieldError> {
    if let Some(limit) = limit {
        if limit < 1 || limit > MAX_PAGINATION as u64 {
            return Err(FieldError::new(
                loc,
                format!("limit must be between 1 and {MAX_PAGINATION}"),
                "value_error.limit",
            ));
        }
    }
    Ok(())
}
