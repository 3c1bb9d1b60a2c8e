//! Local-feature search with geometric verification
//!
//! Candidates are gathered by an ANN search over all query descriptors,
//! grouped by image, and kept only when a homography consistent with their
//! keypoint correspondences survives the shape filters. The similarity of a
//! surviving candidate is the inlier ratio of the fit.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::domain::errors::{CommandError, CommandResult};
use crate::domain::models::descriptor::MAX_PAGINATION;
use crate::domain::models::{KeypointTag, SearchHit, split_composite_key};
use crate::domain::ports::embedding::ImageEmbedding;
use crate::domain::ports::{EmbeddingProvider, ImageFetcher, QueryExpr, VectorCollection};
use crate::services::homography::{MIN_MATCHES, fit_homography};

/// Reprojection threshold of the RANSAC estimator, in pixels.
const REPROJECTION_THRESHOLD: f64 = 5.0;

/// Minimum fraction of matches the homography must explain.
const MIN_INLIER_RATIO: f64 = 0.50;

/// Maximum deviation of the top-left 2x2 condition number from 1.
const MAX_CONDITION_DEVIATION: f64 = 0.1;

/// Bound on the perspective row entries of an acceptable homography.
const MAX_PERSPECTIVE: f64 = 0.1;

/// Rejects urls that would collide with the `%` wildcard of the prefix
/// query path used for composite keys.
pub fn reject_wildcard(url: &str) -> CommandResult<()> {
    if url.contains('%') {
        return Err(CommandError::parameter(
            "Urls of local-feature models must not contain the character '%'",
        ));
    }
    Ok(())
}

/// Searches a local-feature collection by image url.
///
/// Query descriptors come from the index itself when the url is already
/// inserted (one prefix query), otherwise from a fresh extraction of the
/// image. Results keep the insertion order of the candidate map; no global
/// sort or truncation to `limit` is applied, the filters normally bring
/// the result set within it.
pub async fn search_by_url(
    collection: &dyn VectorCollection,
    provider: &dyn EmbeddingProvider,
    fetcher: &dyn ImageFetcher,
    url: &str,
    limit: usize,
) -> CommandResult<Vec<SearchHit>> {
    reject_wildcard(url)?;

    let (descriptors, positions) = query_descriptors(collection, provider, fetcher, url).await?;
    if descriptors.is_empty() {
        return Ok(Vec::new());
    }

    let result_lists = collection.search(descriptors, limit).await?;

    // matchings[v] = [(query position, candidate position), ...] in first
    // encounter order; metadata is keyed on the candidate url part.
    let mut matchings: IndexMap<String, Vec<([f64; 2], [f64; 2])>> = IndexMap::new();
    let mut metadatas: HashMap<String, Value> = HashMap::new();

    for (position, hits) in positions.iter().zip(&result_lists) {
        let mut seen = std::collections::HashSet::new();
        for hit in hits {
            let (candidate, pos) = split_composite_key(&hit.url);
            // Only the first (closest) hit per candidate within one result
            // list contributes a correspondence.
            if !seen.insert(candidate.to_string()) {
                continue;
            }
            let Some(pos) = pos else {
                continue;
            };
            let tag = KeypointTag::parse(pos)?;
            matchings
                .entry(candidate.to_string())
                .or_default()
                .push((*position, tag.position()));
            metadatas
                .entry(candidate.to_string())
                .or_insert_with(|| hit.metadata.clone());
        }
    }

    let mut results = Vec::new();
    for (candidate, pairs) in matchings {
        if pairs.len() < MIN_MATCHES {
            continue;
        }
        let src: Vec<[f64; 2]> = pairs.iter().map(|(q, _)| *q).collect();
        let dst: Vec<[f64; 2]> = pairs.iter().map(|(_, c)| *c).collect();

        let Some(fit) = fit_homography(&src, &dst, REPROJECTION_THRESHOLD) else {
            continue;
        };
        let ratio = fit.inlier_ratio();
        if ratio < MIN_INLIER_RATIO {
            continue;
        }
        if fit.determinant() == 0.0 {
            continue;
        }
        if (1.0 - fit.top_left_condition()).abs() > MAX_CONDITION_DEVIATION {
            continue;
        }
        if fit.matrix[(2, 0)].abs() > MAX_PERSPECTIVE || fit.matrix[(2, 1)].abs() > MAX_PERSPECTIVE
        {
            continue;
        }

        let metadata = metadatas.remove(&candidate).unwrap_or(Value::Null);
        results.push(SearchHit {
            url: candidate,
            metadata,
            similarity: 100.0 * ratio,
        });
    }

    Ok(results)
}

/// Resolves the query-side descriptors and their keypoint positions.
async fn query_descriptors(
    collection: &dyn VectorCollection,
    provider: &dyn EmbeddingProvider,
    fetcher: &dyn ImageFetcher,
    url: &str,
) -> CommandResult<(Vec<Vec<f32>>, Vec<[f64; 2]>)> {
    let rows = collection
        .query(
            QueryExpr::UrlPrefix(format!("{url}#")),
            &["embedding"],
            MAX_PAGINATION,
        )
        .await?;

    if rows.is_empty() {
        let image = fetcher.fetch(url).await?;
        return match provider.image_embedding(&image).await? {
            ImageEmbedding::Local(descriptors) => Ok(descriptors
                .into_iter()
                .map(|d| (d.vector, d.tag.position()))
                .unzip()),
            ImageEmbedding::Global(_) => Err(CommandError::server(
                "Local-feature model produced a single global descriptor",
            )),
        };
    }

    let mut descriptors = Vec::with_capacity(rows.len());
    let mut positions = Vec::with_capacity(rows.len());
    for row in rows {
        let (_, pos) = split_composite_key(&row.url);
        let pos = pos.ok_or_else(|| {
            CommandError::server(format!("Row '{}' is missing its keypoint suffix", row.url))
        })?;
        positions.push(KeypointTag::parse(pos)?.position());
        descriptors.push(row.embedding.ok_or_else(|| {
            CommandError::server(format!("Row '{}' is missing its embedding", row.url))
        })?);
    }
    Ok((descriptors, positions))
}
