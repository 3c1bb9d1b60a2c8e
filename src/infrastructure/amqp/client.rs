//! RPC client over the work queue
//!
//! Each call opens a fresh broker connection: the front-end serves many
//! requests in parallel and a blocking wait for a single correlated reply
//! must never be shared between them. The connection (and with it the
//! exclusive auto-delete reply queue) is dropped when the call returns or
//! times out, so late replies vanish with the queue.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::RpcError;
use crate::domain::ports::Dispatcher;
use crate::infrastructure::amqp::protocol;
use crate::infrastructure::config::AmqpConfig;

/// Dispatcher publishing to the AMQP job queue.
#[derive(Debug, Clone)]
pub struct AmqpDispatcher {
    config: AmqpConfig,
}

impl AmqpDispatcher {
    /// Creates a dispatcher for the configured broker and queue.
    #[must_use]
    pub const fn new(config: AmqpConfig) -> Self {
        Self { config }
    }

    async fn call_inner(&self, command: &str, args: &Value) -> Result<Value, RpcError> {
        let broker_error = |err: lapin::Error| RpcError::server(format!("Broker error: {err}"));

        let connection = Connection::connect(&self.config.url, ConnectionProperties::default())
            .await
            .map_err(broker_error)?;
        let channel = connection.create_channel().await.map_err(broker_error)?;

        let reply_queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(broker_error)?;

        let mut consumer = channel
            .basic_consume(
                reply_queue.name().as_str(),
                "rpc-reply",
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(broker_error)?;

        let correlation_id = Uuid::new_v4().to_string();
        let payload = protocol::encode_request(command, args);

        channel
            .basic_publish(
                "",
                &self.config.queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_reply_to(reply_queue.name().clone())
                    .with_correlation_id(correlation_id.as_str().into()),
            )
            .await
            .map_err(broker_error)?
            .await
            .map_err(broker_error)?;

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery.map_err(broker_error)?;
            let matches = delivery
                .properties
                .correlation_id()
                .as_ref()
                .is_some_and(|id| id.as_str() == correlation_id);
            if matches {
                return protocol::decode_reply(&delivery.data);
            }
        }

        Err(RpcError::server("Reply stream closed before a response arrived"))
    }
}

#[async_trait]
impl Dispatcher for AmqpDispatcher {
    async fn call(&self, command: &str, args: Value) -> Result<Value, RpcError> {
        let deadline = Duration::from_secs(self.config.call_timeout_secs);
        match tokio::time::timeout(deadline, self.call_inner(command, &args)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::server("No response (timeout?)")),
        }
    }
}
