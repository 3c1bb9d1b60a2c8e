//! Milvus-backed vector collection
//!
//! One instance per model. Collections are opened if they exist and created
//! with the fixed schema (url varchar PK, embedding float vector, metadata
//! varchar) plus the model's vector index otherwise. Every read passes
//! `consistencyLevel: "Strong"`.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::domain::errors::{CommandError, CommandResult};
use crate::domain::models::descriptor::{MAX_METADATA_LENGTH, MAX_URL_LENGTH};
use crate::domain::models::{ModelDescriptor, SearchParams, VectorIndex};
use crate::domain::ports::{QueryExpr, QueryRow, SearchMatch, VectorCollection, VectorRecord};
use crate::infrastructure::milvus::client::MilvusClient;

/// A handle to one model's Milvus collection.
pub struct MilvusCollection {
    client: Arc<MilvusClient>,
    descriptor: &'static ModelDescriptor,
}

impl MilvusCollection {
    /// Opens the model's collection, creating and indexing it on first use.
    pub async fn open_or_create(
        client: Arc<MilvusClient>,
        descriptor: &'static ModelDescriptor,
    ) -> CommandResult<Self> {
        if !client.has_collection(descriptor.name).await? {
            client
                .post("/v2/vectordb/collections/create", creation_body(descriptor))
                .await?;
        }
        client.load_collection(descriptor.name).await?;
        Ok(Self { client, descriptor })
    }

    fn render_filter(expr: &QueryExpr) -> String {
        match expr {
            QueryExpr::UrlGreaterThan(cursor) => format!("url > \"{}\"", escape(cursor)),
            QueryExpr::UrlIn(urls) => {
                let quoted: Vec<String> =
                    urls.iter().map(|url| format!("\"{}\"", escape(url))).collect();
                format!("url in [{}]", quoted.join(", "))
            }
            QueryExpr::UrlPrefix(prefix) => format!("url like \"{}%\"", escape(prefix)),
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn creation_body(descriptor: &ModelDescriptor) -> Value {
    let index_params = match descriptor.index {
        VectorIndex::IvfFlat { nlist } => json!({"nlist": nlist}),
        VectorIndex::Hnsw { m, ef_construction } => {
            json!({"M": m, "efConstruction": ef_construction})
        }
    };
    json!({
        "collectionName": descriptor.name,
        "schema": {
            "autoId": false,
            "enableDynamicField": false,
            "fields": [
                {
                    "fieldName": "url",
                    "dataType": "VarChar",
                    "isPrimary": true,
                    "elementTypeParams": {"max_length": MAX_URL_LENGTH}
                },
                {
                    "fieldName": "embedding",
                    "dataType": "FloatVector",
                    "elementTypeParams": {"dim": descriptor.dimension}
                },
                {
                    "fieldName": "metadata",
                    "dataType": "VarChar",
                    "elementTypeParams": {"max_length": MAX_METADATA_LENGTH}
                }
            ]
        },
        "indexParams": [
            {
                "fieldName": "embedding",
                "indexName": "embedding",
                "metricType": descriptor.metric.as_str(),
                "indexType": descriptor.index.as_str(),
                "params": index_params
            },
            {
                "fieldName": "url",
                "indexName": "url",
                "indexType": "INVERTED"
            }
        ]
    })
}

fn search_params(descriptor: &ModelDescriptor) -> Value {
    match descriptor.search_params {
        SearchParams::Nprobe(nprobe) => json!({"nprobe": nprobe}),
        SearchParams::Ef(ef) => json!({"ef": ef}),
    }
}

fn parse_embedding(value: Option<&Value>) -> Option<Vec<f32>> {
    let array = value?.as_array()?;
    #[allow(clippy::cast_possible_truncation)]
    Some(
        array
            .iter()
            .filter_map(Value::as_f64)
            .map(|f| f as f32)
            .collect(),
    )
}

#[async_trait]
impl VectorCollection for MilvusCollection {
    async fn insert(&self, rows: Vec<VectorRecord>) -> CommandResult<()> {
        let data: Vec<Value> = rows
            .into_iter()
            .map(|row| {
                json!({
                    "url": row.url,
                    "embedding": row.embedding,
                    "metadata": row.metadata,
                })
            })
            .collect();
        self.client
            .post(
                "/v2/vectordb/entities/upsert",
                json!({"collectionName": self.descriptor.name, "data": data}),
            )
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        expr: QueryExpr,
        output_fields: &[&str],
        limit: usize,
    ) -> CommandResult<Vec<QueryRow>> {
        let mut fields = vec!["url"];
        fields.extend_from_slice(output_fields);

        let data = self
            .client
            .post(
                "/v2/vectordb/entities/query",
                json!({
                    "collectionName": self.descriptor.name,
                    "filter": Self::render_filter(&expr),
                    "outputFields": fields,
                    "limit": limit,
                    "consistencyLevel": "Strong",
                }),
            )
            .await?;

        let mut rows: Vec<QueryRow> = data
            .as_array()
            .into_iter()
            .flatten()
            .map(|item| QueryRow {
                url: item
                    .get("url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                embedding: parse_embedding(item.get("embedding")),
                metadata: item
                    .get("metadata")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
            })
            .collect();

        // Pagination contract: scans come back ascending by primary key.
        if matches!(expr, QueryExpr::UrlGreaterThan(_)) {
            rows.sort_by(|a, b| a.url.cmp(&b.url));
        }
        Ok(rows)
    }

    async fn search(
        &self,
        vectors: Vec<Vec<f32>>,
        limit: usize,
    ) -> CommandResult<Vec<Vec<SearchMatch>>> {
        let query_count = vectors.len();
        let data = self
            .client
            .post(
                "/v2/vectordb/entities/search",
                json!({
                    "collectionName": self.descriptor.name,
                    "data": vectors,
                    "annsField": "embedding",
                    "limit": limit,
                    "outputFields": ["metadata"],
                    "searchParams": {
                        "metricType": self.descriptor.metric.as_str(),
                        "params": search_params(self.descriptor),
                    },
                    "consistencyLevel": "Strong",
                }),
            )
            .await?;

        let parse_hit = |item: &Value| -> SearchMatch {
            let metadata = item
                .get("metadata")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(Value::Null);
            SearchMatch {
                url: item
                    .get("id")
                    .or_else(|| item.get("url"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                distance: item.get("distance").and_then(Value::as_f64).unwrap_or(0.0),
                metadata,
            }
        };

        let lists = data.as_array().cloned().unwrap_or_default();
        // Single-vector searches come back as a flat hit list; wrap them so
        // callers always see one list per query vector.
        let nested = lists.first().is_some_and(Value::is_array);
        if nested {
            Ok(lists
                .iter()
                .map(|list| {
                    list.as_array()
                        .into_iter()
                        .flatten()
                        .map(parse_hit)
                        .collect()
                })
                .collect())
        } else if query_count <= 1 {
            Ok(vec![lists.iter().map(parse_hit).collect()])
        } else {
            Err(CommandError::server(
                "Milvus returned a flat hit list for a multi-vector search",
            ))
        }
    }

    async fn delete(&self, expr: QueryExpr) -> CommandResult<()> {
        let QueryExpr::UrlIn(_) = &expr else {
            return Err(CommandError::server(
                "Primary-key deletes only support 'url in [...]' expressions",
            ));
        };
        self.client
            .post(
                "/v2/vectordb/entities/delete",
                json!({
                    "collectionName": self.descriptor.name,
                    "filter": Self::render_filter(&expr),
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_filters() {
        assert_eq!(
            MilvusCollection::render_filter(&QueryExpr::UrlGreaterThan("abc".to_string())),
            "url > \"abc\""
        );
        assert_eq!(
            MilvusCollection::render_filter(&QueryExpr::UrlIn(vec![
                "a".to_string(),
                "b".to_string()
            ])),
            "url in [\"a\", \"b\"]"
        );
        assert_eq!(
            MilvusCollection::render_filter(&QueryExpr::UrlPrefix(
                "http://example.com/a.jpg#".to_string()
            )),
            "url like \"http://example.com/a.jpg#%\""
        );
    }

    #[test]
    fn test_render_filter_escapes_quotes() {
        assert_eq!(
            MilvusCollection::render_filter(&QueryExpr::UrlGreaterThan("a\"b".to_string())),
            "url > \"a\\\"b\""
        );
    }
}
