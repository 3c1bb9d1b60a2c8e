//! Vector store port
//!
//! A thin contract over an external ANN database offering upsert, filtered
//! query, vector search, and primary-key delete on named collections. All
//! reads are strongly consistent: they reflect every write acknowledged
//! before the read began.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::CommandResult;

/// A filter expression over the url primary key.
///
/// This is the complete set of expressions the command layer issues;
/// adapters render them into their store's filter syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
    /// `url > cursor` — paginated scan; results MUST come back sorted
    /// ascending by url.
    UrlGreaterThan(String),
    /// `url in [...]` — batch lookup by primary key.
    UrlIn(Vec<String>),
    /// `url like "prefix%"` — prefix scan over composite keys. Callers
    /// guarantee the prefix contains no literal `%`.
    UrlPrefix(String),
}

/// One row to upsert into a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Primary key: the url, or `url#pos` for local-feature models.
    pub url: String,
    /// Embedding vector of the collection's dimension.
    pub embedding: Vec<f32>,
    /// JSON-serialised metadata (`"null"` when absent).
    pub metadata: String,
}

/// One row returned by a filtered query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRow {
    /// Primary key.
    pub url: String,
    /// Embedding, present when requested via `output_fields`.
    pub embedding: Option<Vec<f32>>,
    /// Raw metadata string, present when requested via `output_fields`.
    pub metadata: Option<String>,
}

/// One hit returned by an ANN search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    /// Primary key of the matched row.
    pub url: String,
    /// Distance to the query vector under the collection's metric.
    pub distance: f64,
    /// Parsed metadata of the matched row.
    pub metadata: Value,
}

/// Trait for one model's vector collection.
///
/// A collection's schema, index, and distance metric are fixed at creation;
/// implementations receive the model descriptor when constructed and use
/// its metric and search parameters for every search.
#[async_trait]
pub trait VectorCollection: Send + Sync {
    /// Upserts rows; atomic per call, replacing rows that share a primary
    /// key.
    async fn insert(&self, rows: Vec<VectorRecord>) -> CommandResult<()>;

    /// Strongly consistent filtered read.
    ///
    /// `output_fields` names the non-key fields to materialise
    /// (`"embedding"`, `"metadata"`); the url is always present.
    async fn query(
        &self,
        expr: QueryExpr,
        output_fields: &[&str],
        limit: usize,
    ) -> CommandResult<Vec<QueryRow>>;

    /// ANN search. Returns, for each query vector, up to `limit` hits
    /// ascending by distance, with metadata materialised.
    async fn search(
        &self,
        vectors: Vec<Vec<f32>>,
        limit: usize,
    ) -> CommandResult<Vec<Vec<SearchMatch>>>;

    /// Deletes rows by primary key. Only [`QueryExpr::UrlIn`] is accepted.
    async fn delete(&self, expr: QueryExpr) -> CommandResult<()>;
}
