//! Milvus REST client
//!
//! Thin wrapper over the Milvus v2 `vectordb` HTTP API: authenticated
//! requests, uniform error mapping, and the stock-root-password rotation
//! performed on first connect.

use serde_json::{Value, json};
use std::time::Duration;

use crate::domain::errors::{CommandError, CommandResult};
use crate::infrastructure::config::MilvusConfig;

/// Password Milvus ships with for the root user.
const STOCK_ROOT_PASSWORD: &str = "Milvus";

/// Authenticated client for one Milvus deployment.
#[derive(Debug, Clone)]
pub struct MilvusClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MilvusClient {
    /// Connects to the configured store.
    ///
    /// If the stock root password still authenticates, it is rotated to the
    /// configured one before the client is handed out.
    pub async fn connect(config: &MilvusConfig) -> CommandResult<Self> {
        let stock = Self::with_password(config, STOCK_ROOT_PASSWORD)?;
        if stock.list_collections().await.is_ok() && config.password != STOCK_ROOT_PASSWORD {
            stock
                .update_password(STOCK_ROOT_PASSWORD, &config.password)
                .await?;
            tracing::info!("Rotated the stock root password");
        }

        let client = Self::with_password(config, &config.password)?;
        client.list_collections().await?;
        Ok(client)
    }

    /// Builds a client without probing the store.
    pub fn with_password(config: &MilvusConfig, password: &str) -> CommandResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| CommandError::server(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url: format!("http://{}", config.url),
            token: format!("root:{password}"),
        })
    }

    /// Lists collection names; doubles as the authentication probe.
    pub async fn list_collections(&self) -> CommandResult<Vec<String>> {
        let data = self.post("/v2/vectordb/collections/list", json!({})).await?;
        Ok(data
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect())
    }

    /// Whether a collection exists.
    pub async fn has_collection(&self, name: &str) -> CommandResult<bool> {
        let data = self
            .post("/v2/vectordb/collections/has", json!({"collectionName": name}))
            .await?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    /// Loads a collection into query nodes.
    pub async fn load_collection(&self, name: &str) -> CommandResult<()> {
        self.post("/v2/vectordb/collections/load", json!({"collectionName": name}))
            .await?;
        Ok(())
    }

    /// Changes a user's password.
    pub async fn update_password(&self, old: &str, new: &str) -> CommandResult<()> {
        self.post(
            "/v2/vectordb/users/update_password",
            json!({"userName": "root", "password": old, "newPassword": new}),
        )
        .await?;
        Ok(())
    }

    /// Issues one API call and unwraps the `{code, data}` envelope.
    pub async fn post(&self, path: &str, body: Value) -> CommandResult<Value> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| CommandError::server(format!("Milvus request failed: {err}")))?;

        let status = response.status();
        let envelope: Value = response
            .json()
            .await
            .map_err(|err| CommandError::server(format!("Milvus response unreadable: {err}")))?;

        let code = envelope.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if !status.is_success() || code != 0 {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(CommandError::server(format!(
                "Milvus call {path} failed (code {code}): {message}"
            )));
        }

        Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
    }
}
