//! Dispatcher port
//!
//! The HTTP front-end never executes commands itself: it publishes
//! `(command, args)` onto a durable work queue and awaits the correlated
//! reply. This trait is the seam between the front-end and the queue, and
//! lets tests substitute an in-process stub.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::RpcError;

/// Trait for RPC-style command dispatch.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Executes `command` with positional `args` (a JSON array) and returns
    /// the JSON-decoded result.
    ///
    /// # Errors
    ///
    /// Returns a parameter-kind error when the worker classified the
    /// failure as a client mistake, and a server-kind error for everything
    /// else, including the 10 second reply deadline.
    async fn call(&self, command: &str, args: Value) -> Result<Value, RpcError>;
}
