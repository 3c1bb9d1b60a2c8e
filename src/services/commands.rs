//! Command layer
//!
//! Pure composition of embedding providers and the vector store adapter
//! into the operations exposed over the work queue: insert, search by url,
//! text, or embedding, compare, paginated listing, count, and removal.
//! Workers construct one [`CommandService`] at startup and execute commands
//! sequentially against it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::errors::{CommandError, CommandResult};
use crate::domain::models::descriptor::{MAX_METADATA_LENGTH, MAX_PAGINATION};
use crate::domain::models::{
    Metric, ModelDescriptor, SearchHit, composite_key, similarity_score, split_composite_key,
};
use crate::domain::ports::embedding::ImageEmbedding;
use crate::domain::ports::{
    EmbeddingProvider, ImageFetcher, QueryExpr, VectorCollection, VectorRecord,
};
use crate::services::verification;

/// Error message returned when comparing under a metric without a distance
/// implementation.
pub const DISTANCE_NOT_IMPLEMENTED: &str =
    "Distance calculation has not been implemented in the API. Please contact the administrator.";

/// One model's runtime: its descriptor, provider, and collection handle.
///
/// Handles are initialised once at worker startup and shared across the
/// worker's sequential calls.
pub struct ModelRuntime {
    /// Static model description.
    pub descriptor: &'static ModelDescriptor,
    /// Embedding provider for this model.
    pub provider: Arc<dyn EmbeddingProvider>,
    /// The model's vector collection.
    pub collection: Arc<dyn VectorCollection>,
}

/// Outcome of an insert: urls written and urls skipped as already present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    /// Urls inserted by this call.
    pub added: Vec<String>,
    /// Urls skipped because they were already in the collection (only
    /// populated when `replace_existing` is false).
    pub found: Vec<String>,
}

/// Result of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListOutput {
    /// Bare urls (the default output).
    Urls(Vec<String>),
    /// One object per row carrying the requested output fields.
    Records(Vec<Value>),
}

impl ListOutput {
    /// Number of items in the page.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Urls(urls) => urls.len(),
            Self::Records(records) => records.len(),
        }
    }

    /// Whether the page is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The command layer: one entry point per work queue command.
pub struct CommandService {
    models: HashMap<&'static str, ModelRuntime>,
    fetcher: Arc<dyn ImageFetcher>,
}

impl CommandService {
    /// Creates a service over the given model runtimes.
    #[must_use]
    pub fn new(models: Vec<ModelRuntime>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let models = models
            .into_iter()
            .map(|runtime| (runtime.descriptor.name, runtime))
            .collect();
        Self { models, fetcher }
    }

    fn model(&self, name: &str) -> CommandResult<&ModelRuntime> {
        self.models
            .get(name)
            .ok_or_else(|| CommandError::parameter(format!("Unknown model: {name}")))
    }

    /// Liveness probe; answers `"pong"`.
    #[must_use]
    pub fn ping(&self) -> &'static str {
        "pong"
    }

    /// Inserts images into a model's collection.
    ///
    /// Embeddings are computed for every url that has none supplied; for
    /// local-feature models each image expands into one row per descriptor
    /// under a composite key, the metadata duplicated across them. With
    /// `replace_existing` unset, urls already present are skipped and
    /// reported in `found`. An empty supplied embedding counts as absent.
    pub async fn insert_images(
        &self,
        model: &str,
        urls: Vec<String>,
        metadatas: Vec<Value>,
        embeddings: Option<Vec<Vec<f32>>>,
        replace_existing: bool,
    ) -> CommandResult<InsertOutcome> {
        let runtime = self.model(model)?;
        if urls.len() != metadatas.len() {
            return Err(CommandError::parameter(format!(
                "Expected one metadata per url, got {} urls and {} metadatas",
                urls.len(),
                metadatas.len()
            )));
        }

        if runtime.descriptor.is_local_feature() {
            for url in &urls {
                verification::reject_wildcard(url)?;
            }
        }

        let found = if replace_existing || urls.is_empty() {
            Vec::new()
        } else {
            let rows = runtime
                .collection
                .query(QueryExpr::UrlIn(urls.clone()), &[], urls.len())
                .await?;
            let present: HashSet<String> = rows.into_iter().map(|row| row.url).collect();
            urls.iter().filter(|url| present.contains(*url)).cloned().collect()
        };
        let found_set: HashSet<&String> = found.iter().collect();

        let mut added = Vec::new();
        let mut rows = Vec::new();
        for (index, url) in urls.iter().enumerate() {
            if found_set.contains(url) {
                continue;
            }
            added.push(url.clone());

            let metadata = serialize_metadata(metadatas.get(index).unwrap_or(&Value::Null))?;
            let supplied = embeddings
                .as_ref()
                .and_then(|list| list.get(index))
                .filter(|vector| !vector.is_empty());

            if let Some(vector) = supplied {
                rows.push(VectorRecord {
                    url: url.clone(),
                    embedding: vector.clone(),
                    metadata,
                });
            } else {
                let image = self.fetcher.fetch(url).await?;
                match runtime.provider.image_embedding(&image).await? {
                    ImageEmbedding::Global(vector) => rows.push(VectorRecord {
                        url: url.clone(),
                        embedding: vector,
                        metadata,
                    }),
                    ImageEmbedding::Local(descriptors) => {
                        for descriptor in descriptors {
                            rows.push(VectorRecord {
                                url: composite_key(url, &descriptor.tag),
                                embedding: descriptor.vector,
                                metadata: metadata.clone(),
                            });
                        }
                    }
                }
            }
        }

        if !rows.is_empty() {
            runtime.collection.insert(rows).await?;
        }

        Ok(InsertOutcome { added, found })
    }

    /// Searches a collection with pre-computed query embeddings.
    ///
    /// Issues a single ANN search and returns the hits of the first query
    /// vector in ascending distance order.
    pub async fn search_by_embeddings(
        &self,
        model: &str,
        embeddings: Vec<Vec<f32>>,
        limit: usize,
    ) -> CommandResult<Vec<SearchHit>> {
        let runtime = self.model(model)?;
        let mut result_lists = runtime.collection.search(embeddings, limit).await?;
        let hits = if result_lists.is_empty() {
            Vec::new()
        } else {
            result_lists.swap_remove(0)
        };
        Ok(hits
            .into_iter()
            .map(|hit| SearchHit {
                url: hit.url,
                metadata: hit.metadata,
                similarity: similarity_score(hit.distance),
            })
            .collect())
    }

    /// Searches a collection by image url.
    pub async fn search_by_url(
        &self,
        model: &str,
        url: &str,
        limit: usize,
    ) -> CommandResult<Vec<SearchHit>> {
        let runtime = self.model(model)?;
        if runtime.descriptor.is_local_feature() {
            return verification::search_by_url(
                runtime.collection.as_ref(),
                runtime.provider.as_ref(),
                self.fetcher.as_ref(),
                url,
                limit,
            )
            .await;
        }

        let image = self.fetcher.fetch(url).await?;
        let embedding = self.global_embedding(runtime, &image).await?;
        self.search_by_embeddings(model, vec![embedding], limit).await
    }

    /// Searches a collection by text query.
    pub async fn search_by_text(
        &self,
        model: &str,
        text: &str,
        limit: usize,
    ) -> CommandResult<Vec<SearchHit>> {
        let runtime = self.model(model)?;
        let embedding = runtime.provider.text_embedding(text).await?;
        self.search_by_embeddings(model, vec![embedding], limit).await
    }

    /// Computes the similarity of two images without touching the index.
    pub async fn compare(&self, model: &str, url_left: &str, url_right: &str) -> CommandResult<f64> {
        let runtime = self.model(model)?;
        if runtime.descriptor.is_local_feature() || runtime.descriptor.metric != Metric::L2 {
            return Err(CommandError::server(DISTANCE_NOT_IMPLEMENTED));
        }

        let (left, right) = tokio::join!(
            self.fetcher.fetch(url_left),
            self.fetcher.fetch(url_right)
        );
        // Left-image errors take precedence on double failure.
        let left = self.global_embedding(runtime, &left?).await?;
        let right = self.global_embedding(runtime, &right?).await?;

        // Squared L2, consistent with the distances the store reports.
        let distance: f64 = left
            .iter()
            .zip(&right)
            .map(|(l, r)| (f64::from(*l) - f64::from(*r)).powi(2))
            .sum();
        Ok(similarity_score(distance))
    }

    /// Lists a page of a collection, sorted ascending by url.
    ///
    /// Without `output_fields`, local-feature collections are listed by
    /// distinct image url: the cursor is advanced past the current url's
    /// composite-key block by appending `"Z"`, and the page is reduced to
    /// the set of url parts. A url lexically starting with the previous url
    /// followed by `"Z"` can be skipped by this approximation.
    pub async fn list_images(
        &self,
        model: &str,
        cursor: Option<String>,
        limit: Option<usize>,
        output_fields: Option<Vec<String>>,
    ) -> CommandResult<ListOutput> {
        let runtime = self.model(model)?;
        let cursor = cursor.unwrap_or_default();
        let limit = limit.unwrap_or(MAX_PAGINATION);

        let Some(fields) = output_fields else {
            if runtime.descriptor.is_local_feature() {
                let rows = runtime
                    .collection
                    .query(QueryExpr::UrlGreaterThan(format!("{cursor}Z")), &[], limit)
                    .await?;
                let urls: BTreeSet<String> = rows
                    .into_iter()
                    .map(|row| split_composite_key(&row.url).0.to_string())
                    .collect();
                return Ok(ListOutput::Urls(urls.into_iter().collect()));
            }
            let rows = runtime
                .collection
                .query(QueryExpr::UrlGreaterThan(cursor), &[], limit)
                .await?;
            return Ok(ListOutput::Urls(rows.into_iter().map(|row| row.url).collect()));
        };

        let requested: Vec<&str> = fields
            .iter()
            .map(String::as_str)
            .filter(|field| *field == "embedding" || *field == "metadata")
            .collect();
        let rows = runtime
            .collection
            .query(QueryExpr::UrlGreaterThan(cursor), &requested, limit)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = Map::new();
            for field in &fields {
                match field.as_str() {
                    "url" => {
                        record.insert("url".to_string(), Value::String(row.url.clone()));
                    }
                    "embedding" => {
                        let embedding = row.embedding.clone().ok_or_else(|| {
                            CommandError::server(format!(
                                "Row '{}' is missing its embedding",
                                row.url
                            ))
                        })?;
                        record.insert("embedding".to_string(), serde_json::to_value(embedding)?);
                    }
                    "metadata" => {
                        let raw = row.metadata.as_deref().unwrap_or("null");
                        let metadata: Value = serde_json::from_str(raw)
                            .map_err(|err| CommandError::server(err.to_string()))?;
                        record.insert("metadata".to_string(), metadata);
                    }
                    other => {
                        return Err(CommandError::parameter(format!(
                            "Unknown output field: {other}"
                        )));
                    }
                }
            }
            records.push(Value::Object(record));
        }
        Ok(ListOutput::Records(records))
    }

    /// Counts the distinct urls of a collection via strict cursor
    /// pagination (`url > cursor` keeps pages disjoint).
    pub async fn count(&self, model: &str) -> CommandResult<usize> {
        let mut total = 0usize;
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_images(model, cursor, None, None).await?;
            let ListOutput::Urls(urls) = page else {
                return Err(CommandError::server("Pagination produced records"));
            };
            let Some(last) = urls.last().cloned() else {
                return Ok(total);
            };
            total += urls.len();
            cursor = Some(last);
        }
    }

    /// Removes images from a collection.
    ///
    /// For local-feature models every url is first resolved to its
    /// composite keys with a prefix scan; deletes stay batched per url to
    /// keep expressions bounded.
    pub async fn remove_images(&self, model: &str, urls: Vec<String>) -> CommandResult<()> {
        let runtime = self.model(model)?;
        if urls.is_empty() {
            return Ok(());
        }

        if !runtime.descriptor.is_local_feature() {
            return runtime.collection.delete(QueryExpr::UrlIn(urls)).await;
        }

        for url in urls {
            verification::reject_wildcard(&url)?;
            let rows = runtime
                .collection
                .query(
                    QueryExpr::UrlPrefix(format!("{url}#")),
                    &[],
                    MAX_PAGINATION,
                )
                .await?;
            let keys: Vec<String> = rows.into_iter().map(|row| row.url).collect();
            if !keys.is_empty() {
                runtime.collection.delete(QueryExpr::UrlIn(keys)).await?;
            }
        }
        Ok(())
    }

    async fn global_embedding(
        &self,
        runtime: &ModelRuntime,
        image: &image::DynamicImage,
    ) -> CommandResult<Vec<f32>> {
        match runtime.provider.image_embedding(image).await? {
            ImageEmbedding::Global(vector) => Ok(vector),
            ImageEmbedding::Local(_) => Err(CommandError::server(
                "Global-feature model produced local descriptors",
            )),
        }
    }
}

/// Serialises metadata and enforces the storage length bound.
fn serialize_metadata(metadata: &Value) -> CommandResult<String> {
    let serialized = serde_json::to_string(metadata)?;
    if serialized.len() > MAX_METADATA_LENGTH {
        return Err(CommandError::parameter(format!(
            "metadata json too long ({} > {MAX_METADATA_LENGTH})",
            serialized.len()
        )));
    }
    Ok(serialized)
}
