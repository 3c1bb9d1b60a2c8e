//! In-memory vector collection
//!
//! Mirrors the observable semantics of the Milvus adapter over a sorted
//! map: upsert on key conflict, ascending scans, prefix and batch lookups,
//! exact nearest-neighbour search. Reads are trivially strongly consistent.
//! Used by the test suite and for running the stack without a store.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

use crate::domain::errors::{CommandError, CommandResult};
use crate::domain::models::Metric;
use crate::domain::ports::{QueryExpr, QueryRow, SearchMatch, VectorCollection, VectorRecord};

#[derive(Debug, Clone)]
struct StoredRow {
    embedding: Vec<f32>,
    metadata: String,
}

/// A sorted in-memory collection.
pub struct InMemoryCollection {
    metric: Metric,
    rows: RwLock<BTreeMap<String, StoredRow>>,
}

impl InMemoryCollection {
    /// Creates an empty collection with the given metric.
    #[must_use]
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    fn distance(&self, left: &[f32], right: &[f32]) -> f64 {
        let pairs = left.iter().zip(right);
        match self.metric {
            Metric::L2 => pairs
                .map(|(l, r)| (f64::from(*l) - f64::from(*r)).powi(2))
                .sum(),
            // Inner product similarity, negated so smaller still means closer.
            Metric::Ip => -pairs.map(|(l, r)| f64::from(*l) * f64::from(*r)).sum::<f64>(),
        }
    }
}

#[async_trait]
impl VectorCollection for InMemoryCollection {
    async fn insert(&self, records: Vec<VectorRecord>) -> CommandResult<()> {
        let mut rows = self.rows.write().await;
        for record in records {
            rows.insert(
                record.url,
                StoredRow {
                    embedding: record.embedding,
                    metadata: record.metadata,
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        expr: QueryExpr,
        output_fields: &[&str],
        limit: usize,
    ) -> CommandResult<Vec<QueryRow>> {
        let rows = self.rows.read().await;
        let want_embedding = output_fields.contains(&"embedding");
        let want_metadata = output_fields.contains(&"metadata");

        let materialise = |url: &String, row: &StoredRow| QueryRow {
            url: url.clone(),
            embedding: want_embedding.then(|| row.embedding.clone()),
            metadata: want_metadata.then(|| row.metadata.clone()),
        };

        let selected: Vec<QueryRow> = match expr {
            QueryExpr::UrlGreaterThan(cursor) => rows
                .range::<String, _>((Bound::Excluded(&cursor), Bound::Unbounded))
                .take(limit)
                .map(|(url, row)| materialise(url, row))
                .collect(),
            QueryExpr::UrlIn(urls) => {
                let mut found: Vec<QueryRow> = urls
                    .iter()
                    .filter_map(|url| rows.get_key_value(url))
                    .map(|(url, row)| materialise(url, row))
                    .collect();
                found.sort_by(|a, b| a.url.cmp(&b.url));
                found.dedup_by(|a, b| a.url == b.url);
                found.truncate(limit);
                found
            }
            QueryExpr::UrlPrefix(prefix) => rows
                .range::<String, _>((Bound::Included(&prefix), Bound::Unbounded))
                .take_while(|(url, _)| url.starts_with(&prefix))
                .take(limit)
                .map(|(url, row)| materialise(url, row))
                .collect(),
        };
        Ok(selected)
    }

    async fn search(
        &self,
        vectors: Vec<Vec<f32>>,
        limit: usize,
    ) -> CommandResult<Vec<Vec<SearchMatch>>> {
        let rows = self.rows.read().await;
        let mut result_lists = Vec::with_capacity(vectors.len());

        for vector in &vectors {
            let mut hits: Vec<SearchMatch> = rows
                .iter()
                .map(|(url, row)| SearchMatch {
                    url: url.clone(),
                    distance: self.distance(vector, &row.embedding),
                    metadata: serde_json::from_str(&row.metadata).unwrap_or(Value::Null),
                })
                .collect();
            hits.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.url.cmp(&b.url))
            });
            hits.truncate(limit);
            result_lists.push(hits);
        }

        Ok(result_lists)
    }

    async fn delete(&self, expr: QueryExpr) -> CommandResult<()> {
        let QueryExpr::UrlIn(urls) = expr else {
            return Err(CommandError::server(
                "Primary-key deletes only support 'url in [...]' expressions",
            ));
        };
        let mut rows = self.rows.write().await;
        for url in urls {
            rows.remove(&url);
        }
        Ok(())
    }
}
