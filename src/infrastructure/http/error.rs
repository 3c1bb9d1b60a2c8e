//! HTTP error mapping
//!
//! Parameter errors answer 422, conflicts 409, everything else 500.
//! Validation failures reproduce the detail-list shape clients of the
//! original API already parse: `{"detail": [{"loc", "msg", "type"}]}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use crate::domain::errors::{RpcError, RpcErrorKind};

/// One field-level validation failure.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    /// Location of the offending value, e.g. `["body", "url"]`.
    pub loc: Vec<String>,
    /// Human-readable message.
    pub msg: String,
    /// Machine-readable error type.
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    /// Builds a field error.
    pub fn new(loc: &[&str], msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc: loc.iter().map(ToString::to_string).collect(),
            msg: msg.into(),
            kind: kind.into(),
        }
    }

    /// Returns a copy of this error anchored at the given location.
    #[must_use]
    pub fn at(mut self, loc: Vec<String>) -> Self {
        self.loc = loc;
        self
    }
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Request validation failed before dispatch.
    Validation(Vec<FieldError>),
    /// The worker classified the failure as a client mistake.
    Parameter(String),
    /// A bare-detail 422 (e.g. a search without url or text).
    Unprocessable(String),
    /// Insert of an already indexed url via `search_add`.
    Conflict(String),
    /// Upstream failure, timeout, or unimplemented path.
    Server(String),
}

impl ApiError {
    /// Wraps a single field error.
    #[must_use]
    pub fn field(error: FieldError) -> Self {
        Self::Validation(vec![error])
    }
}

impl From<RpcError> for ApiError {
    fn from(err: RpcError) -> Self {
        match err.kind {
            RpcErrorKind::Parameter => Self::Parameter(err.message),
            RpcErrorKind::Server => Self::Server(err.message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": errors})),
            )
                .into_response(),
            Self::Parameter(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": [{"msg": msg, "type": "parameter_error"}]})),
            )
                .into_response(),
            Self::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": msg})),
            )
                .into_response(),
            Self::Conflict(msg) => {
                (StatusCode::CONFLICT, Json(json!({"detail": msg}))).into_response()
            }
            Self::Server(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": [{"msg": msg, "type": "server_error"}]})),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_mapping() {
        let api: ApiError = RpcError::parameter("bad").into();
        assert_eq!(api, ApiError::Parameter("bad".to_string()));

        let api: ApiError = RpcError::server("boom").into();
        assert_eq!(api, ApiError::Server("boom".to_string()));
    }

    #[test]
    fn test_field_error_serialises_type_key() {
        let error = FieldError::new(&["body", "url"], "invalid", "value_error.url.scheme");
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["type"], "value_error.url.scheme");
        assert_eq!(value["loc"], serde_json::json!(["body", "url"]));
    }
}
