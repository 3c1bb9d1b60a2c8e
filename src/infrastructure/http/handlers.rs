//! Route handlers
//!
//! Each handler validates its inputs, issues one (or, for bulk insert,
//! several) dispatcher calls, and maps the result onto the documented
//! status codes. Handlers never touch the vector store or the providers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::schemas::{
    CompareRequest, ImageAndMetadata, PageRequest, PingParams, RestoreEntry, SearchRequest,
    SingleImage, validate_limit, validate_metadata, validate_model, validate_url,
};
use crate::infrastructure::http::server::AppState;

/// `GET /ping` — liveness; with `?rpc=1` the ping round-trips the queue.
pub async fn ping(
    State(state): State<AppState>,
    Query(params): Query<PingParams>,
) -> Result<Json<Value>, ApiError> {
    if params.rpc_requested() {
        let value = state.dispatcher.call("ping", json!([])).await?;
        return Ok(Json(value));
    }
    Ok(Json(json!("pong")))
}

/// `POST /models/{model}/add` — adds an image embedding to the index.
pub async fn add(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(body): Json<ImageAndMetadata>,
) -> Result<StatusCode, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;
    validate_url(&body.url, &["body", "url"]).map_err(ApiError::field)?;
    validate_metadata(body.metadata.as_ref(), &["body", "metadata"]).map_err(ApiError::field)?;

    state
        .dispatcher
        .call(
            "insert_images",
            json!([model, [body.url], [body.metadata]]),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /models/{model}/search_add` — adds unless the url already exists.
pub async fn search_add(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(body): Json<ImageAndMetadata>,
) -> Result<StatusCode, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;
    validate_url(&body.url, &["body", "url"]).map_err(ApiError::field)?;
    validate_metadata(body.metadata.as_ref(), &["body", "metadata"]).map_err(ApiError::field)?;

    let result = state
        .dispatcher
        .call(
            "insert_images",
            json!([model, [body.url], [body.metadata], null, false]),
        )
        .await?;

    let found = result
        .get("found")
        .and_then(Value::as_array)
        .is_some_and(|found| !found.is_empty());
    if found {
        return Err(ApiError::Conflict("Image already inserted".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /models/{model}/add_bulk` — per-entry insert with explicit partial
/// failure.
pub async fn add_bulk(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(entries): Json<Vec<ImageAndMetadata>>,
) -> Result<Json<Value>, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;

    let mut field_errors = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        if let Err(error) = validate_url(&entry.url, &["body", "url"]) {
            field_errors.push(error.at(vec![
                "body".to_string(),
                index.to_string(),
                "url".to_string(),
            ]));
        }
        if let Err(error) = validate_metadata(entry.metadata.as_ref(), &["body", "metadata"]) {
            field_errors.push(error.at(vec![
                "body".to_string(),
                index.to_string(),
                "metadata".to_string(),
            ]));
        }
    }
    if !field_errors.is_empty() {
        return Err(ApiError::Validation(field_errors));
    }

    let mut added = Vec::new();
    let mut found = Vec::new();
    let mut failed = Vec::new();
    for entry in entries {
        let result = state
            .dispatcher
            .call(
                "insert_images",
                json!([model, [entry.url.clone()], [entry.metadata], null, false]),
            )
            .await;
        match result {
            Ok(outcome) => {
                extend_from(&mut added, &outcome, "added");
                extend_from(&mut found, &outcome, "found");
            }
            Err(error) => failed.push(json!({"url": entry.url, "error": error.message})),
        }
    }

    Ok(Json(json!({"added": added, "found": found, "failed": failed})))
}

fn extend_from(target: &mut Vec<Value>, outcome: &Value, key: &str) {
    if let Some(values) = outcome.get(key).and_then(Value::as_array) {
        target.extend(values.iter().cloned());
    }
}

/// `POST /models/{model}/restore` — re-inserts dumped entries with their
/// embeddings.
pub async fn restore(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(entries): Json<Vec<RestoreEntry>>,
) -> Result<StatusCode, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;
    for entry in &entries {
        validate_metadata(entry.metadata.as_ref(), &["body", "metadata"])
            .map_err(ApiError::field)?;
    }

    let urls: Vec<&String> = entries.iter().map(|entry| &entry.url).collect();
    let metadatas: Vec<&Option<Value>> = entries.iter().map(|entry| &entry.metadata).collect();
    let embeddings: Vec<&Vec<f32>> = entries.iter().map(|entry| &entry.embedding).collect();

    state
        .dispatcher
        .call("insert_images", json!([model, urls, metadatas, embeddings]))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /models/{model}/search` — by url or by text.
pub async fn search(
    State(state): State<AppState>,
    Path(model): Path<String>,
    body: Option<Json<SearchRequest>>,
) -> Result<Json<Value>, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;
    let body = body.map(|Json(body)| body).unwrap_or_default();
    validate_limit(body.limit, &["body", "limit"]).map_err(ApiError::field)?;
    let limit = body.limit.unwrap_or(10);

    if let Some(url) = body.url {
        validate_url(&url, &["body", "url"]).map_err(ApiError::field)?;
        let hits = state
            .dispatcher
            .call("search_by_url", json!([model, url, limit]))
            .await?;
        return Ok(Json(hits));
    }
    if let Some(text) = body.text {
        let hits = state
            .dispatcher
            .call("search_by_text", json!([model, text, limit]))
            .await?;
        return Ok(Json(hits));
    }
    Err(ApiError::Unprocessable(
        "Either 'text' or 'url' must be provided.".to_string(),
    ))
}

/// `POST /models/{model}/compare` — similarity of two images.
pub async fn compare(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(body): Json<CompareRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;
    validate_url(&body.url, &["body", "url"]).map_err(ApiError::field)?;
    validate_url(&body.other, &["body", "other"]).map_err(ApiError::field)?;

    let similarity = state
        .dispatcher
        .call("compare", json!([model, body.url, body.other]))
        .await?;
    Ok(Json(similarity))
}

/// `POST /models/{model}/urls` — paginated url listing.
pub async fn urls(
    State(state): State<AppState>,
    Path(model): Path<String>,
    body: Option<Json<PageRequest>>,
) -> Result<Json<Value>, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;
    let body = body.map(|Json(body)| body).unwrap_or_default();
    validate_limit(body.limit, &["body", "limit"]).map_err(ApiError::field)?;

    let page = state
        .dispatcher
        .call("list_images", json!([model, body.cursor, body.limit]))
        .await?;
    Ok(Json(page))
}

/// `POST /models/{model}/dump` — paginated full-entry listing.
pub async fn dump(
    State(state): State<AppState>,
    Path(model): Path<String>,
    body: Option<Json<PageRequest>>,
) -> Result<Json<Value>, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;
    let body = body.map(|Json(body)| body).unwrap_or_default();
    validate_limit(body.limit, &["body", "limit"]).map_err(ApiError::field)?;

    let page = state
        .dispatcher
        .call(
            "list_images",
            json!([model, body.cursor, body.limit, ["url", "embedding", "metadata"]]),
        )
        .await?;
    Ok(Json(page))
}

/// `GET /models/{model}/count` — number of distinct indexed urls.
pub async fn count(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> Result<Json<Value>, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;
    let total = state.dispatcher.call("count", json!([model])).await?;
    Ok(Json(total))
}

/// `POST /models/{model}/remove` — removes an image from the index.
pub async fn remove(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(body): Json<SingleImage>,
) -> Result<StatusCode, ApiError> {
    validate_model(&model).map_err(ApiError::field)?;
    validate_url(&body.url, &["body", "url"]).map_err(ApiError::field)?;

    state
        .dispatcher
        .call("remove_images", json!([model, [body.url]]))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
