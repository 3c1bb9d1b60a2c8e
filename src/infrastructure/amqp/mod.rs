//! AMQP work queue dispatcher
//!
//! RPC-style request/response over a durable broker. The front-end
//! publishes `[command, args]` with a correlation id and a private reply
//! queue; one of N competing workers executes the command and publishes the
//! JSON result (or an encoded exception) back.

pub mod client;
pub mod protocol;
pub mod worker;

pub use client::AmqpDispatcher;
pub use worker::RpcWorker;
