//! Queue worker
//!
//! Consumes jobs from the shared queue with `prefetch_count = 1` so a long
//! job never starves idle peers, executes them against the command layer,
//! publishes the reply to the caller's private queue, and acknowledges.
//! Exceptions are serialised into the reply instead of crashing the worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::errors::{CommandError, CommandResult};
use crate::infrastructure::amqp::protocol;
use crate::infrastructure::config::AmqpConfig;
use crate::services::CommandService;

/// A worker process bound to one job queue.
pub struct RpcWorker {
    config: AmqpConfig,
    service: Arc<CommandService>,
    healthy: Arc<AtomicBool>,
}

impl RpcWorker {
    /// Creates a worker over the given command service.
    #[must_use]
    pub fn new(config: AmqpConfig, service: Arc<CommandService>) -> Self {
        Self {
            config,
            service,
            healthy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared health flag, true while the broker connection is open.
    #[must_use]
    pub fn health_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.healthy)
    }

    /// Consumes jobs until the broker connection closes.
    pub async fn run(&self) -> anyhow::Result<()> {
        let connection =
            Connection::connect(&self.config.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        // One unacknowledged message at a time; the broker round-robins the
        // rest across competing workers.
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let mut consumer = channel
            .basic_consume(
                &self.config.queue,
                "idios-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        self.healthy.store(true, Ordering::SeqCst);
        info!("Awaiting RPC requests on '{}'", self.config.queue);

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            self.handle(&channel, delivery).await?;
        }

        self.healthy.store(false, Ordering::SeqCst);
        info!("Stopping");
        Ok(())
    }

    async fn handle(&self, channel: &Channel, delivery: Delivery) -> anyhow::Result<()> {
        info!("{}", protocol::truncate_body(&delivery.data));

        let reply = match protocol::decode_request(&delivery.data) {
            Ok((command, args)) => match execute(&self.service, &command, args).await {
                Ok(result) => protocol::encode_success(&result),
                Err(error) => {
                    warn!(command = %command, error = %error, "Command failed");
                    protocol::encode_error(&error)
                }
            },
            Err(error) => {
                warn!(error = %error, "Undecodable job body");
                protocol::encode_error(&error)
            }
        };

        if let Some(reply_to) = delivery.properties.reply_to() {
            let correlation_id = delivery
                .properties
                .correlation_id()
                .clone()
                .unwrap_or_default();
            channel
                .basic_publish(
                    "",
                    reply_to.as_str(),
                    BasicPublishOptions::default(),
                    &reply,
                    BasicProperties::default().with_correlation_id(correlation_id),
                )
                .await?
                .await?;
        }

        delivery.ack(BasicAckOptions::default()).await?;
        Ok(())
    }
}

/// Serves the worker's plain HTTP health endpoint.
///
/// Answers 200 while the broker connection is open and 503 otherwise.
pub async fn serve_health(port: u16, healthy: Arc<AtomicBool>) -> anyhow::Result<()> {
    let app = Router::new().route(
        "/healthz",
        get(move || {
            let healthy = Arc::clone(&healthy);
            async move {
                if healthy.load(Ordering::SeqCst) {
                    (StatusCode::OK, "OK")
                } else {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Broker connection is closed or channel is not open",
                    )
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Executes one decoded command against the service, spreading the
/// positional arguments.
pub async fn execute(
    service: &CommandService,
    command: &str,
    args: Vec<Value>,
) -> CommandResult<Value> {
    match command {
        "ping" => Ok(Value::String(service.ping().to_string())),
        "insert_images" => {
            let model: String = arg(&args, 0, "model")?;
            let urls: Vec<String> = arg(&args, 1, "urls")?;
            let metadatas: Vec<Value> = arg(&args, 2, "metadatas")?;
            let embeddings: Option<Vec<Vec<f32>>> = opt_arg(&args, 3, "embeddings")?;
            let replace_existing: bool = opt_arg(&args, 4, "replace_existing")?.unwrap_or(true);
            let outcome = service
                .insert_images(&model, urls, metadatas, embeddings, replace_existing)
                .await?;
            Ok(serde_json::to_value(outcome)?)
        }
        "search_by_url" => {
            let model: String = arg(&args, 0, "model")?;
            let url: String = arg(&args, 1, "url")?;
            let limit: usize = opt_arg(&args, 2, "limit")?.unwrap_or(10);
            let hits = service.search_by_url(&model, &url, limit).await?;
            Ok(serde_json::to_value(hits)?)
        }
        "search_by_text" => {
            let model: String = arg(&args, 0, "model")?;
            let text: String = arg(&args, 1, "text")?;
            let limit: usize = opt_arg(&args, 2, "limit")?.unwrap_or(10);
            let hits = service.search_by_text(&model, &text, limit).await?;
            Ok(serde_json::to_value(hits)?)
        }
        "compare" => {
            let model: String = arg(&args, 0, "model")?;
            let url_left: String = arg(&args, 1, "url_left")?;
            let url_right: String = arg(&args, 2, "url_right")?;
            let similarity = service.compare(&model, &url_left, &url_right).await?;
            Ok(serde_json::to_value(similarity)?)
        }
        "list_images" => {
            let model: String = arg(&args, 0, "model")?;
            let cursor: Option<String> = opt_arg(&args, 1, "cursor")?;
            let limit: Option<usize> = opt_arg(&args, 2, "limit")?;
            let output_fields: Option<Vec<String>> = opt_arg(&args, 3, "output_fields")?;
            let page = service.list_images(&model, cursor, limit, output_fields).await?;
            Ok(serde_json::to_value(page)?)
        }
        "count" => {
            let model: String = arg(&args, 0, "model")?;
            let total = service.count(&model).await?;
            Ok(serde_json::to_value(total)?)
        }
        "remove_images" => {
            let model: String = arg(&args, 0, "model")?;
            let urls: Vec<String> = arg(&args, 1, "urls")?;
            service.remove_images(&model, urls).await?;
            Ok(Value::Null)
        }
        other => Err(CommandError::server(format!("Unknown command: {other}"))),
    }
}

fn arg<T: DeserializeOwned>(args: &[Value], index: usize, name: &str) -> CommandResult<T> {
    let value = args
        .get(index)
        .cloned()
        .ok_or_else(|| CommandError::parameter(format!("Missing argument {index} ({name})")))?;
    serde_json::from_value(value)
        .map_err(|err| CommandError::parameter(format!("Invalid argument {index} ({name}): {err}")))
}

fn opt_arg<T: DeserializeOwned>(args: &[Value], index: usize, name: &str) -> CommandResult<Option<T>> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|err| {
                CommandError::parameter(format!("Invalid argument {index} ({name}): {err}"))
            }),
    }
}
