//! Wire protocol of the work queue
//!
//! Requests are JSON arrays `[command, args]` where `args` is a positional
//! array. Replies are either the JSON-encoded result or an exception body
//! `{"exception_type": ..., "exception_args": [...]}`. Parameter errors
//! travel as `ValueError`, everything else as `RuntimeError`.

use serde_json::{Value, json};

use crate::domain::errors::{CommandError, RpcError};

/// Encodes a request envelope.
#[must_use]
pub fn encode_request(command: &str, args: &Value) -> Vec<u8> {
    json!([command, args]).to_string().into_bytes()
}

/// Decodes a request envelope into the command name and its positional
/// arguments.
pub fn decode_request(body: &[u8]) -> Result<(String, Vec<Value>), CommandError> {
    let envelope: Value = serde_json::from_slice(body)
        .map_err(|err| CommandError::server(format!("Malformed job body: {err}")))?;
    let Some([command, args]) = envelope.as_array().map(Vec::as_slice).and_then(|s| {
        <&[Value; 2]>::try_from(s).ok()
    }) else {
        return Err(CommandError::server("Malformed job body: expected [command, args]"));
    };
    let command = command
        .as_str()
        .ok_or_else(|| CommandError::server("Malformed job body: command must be a string"))?;
    let args = args
        .as_array()
        .cloned()
        .ok_or_else(|| CommandError::server("Malformed job body: args must be an array"))?;
    Ok((command.to_string(), args))
}

/// Encodes a successful reply.
#[must_use]
pub fn encode_success(result: &Value) -> Vec<u8> {
    result.to_string().into_bytes()
}

/// Encodes an error reply.
#[must_use]
pub fn encode_error(error: &CommandError) -> Vec<u8> {
    json!({
        "exception_type": error.wire_name(),
        "exception_args": [error.to_string()],
    })
    .to_string()
    .into_bytes()
}

/// Decodes a reply body, reconstructing transported exceptions.
pub fn decode_reply(body: &[u8]) -> Result<Value, RpcError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| RpcError::server(format!("Malformed reply body: {err}")))?;

    if let Some(object) = value.as_object() {
        if let (Some(exception_type), Some(exception_args)) = (
            object.get("exception_type").and_then(Value::as_str),
            object.get("exception_args").and_then(Value::as_array),
        ) {
            let message = exception_args
                .iter()
                .map(|arg| match arg {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            return Err(RpcError::from_wire(exception_type, message));
        }
    }

    Ok(value)
}

/// Truncates a job body for logging, keeping the head and tail.
#[must_use]
pub fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() > 60 {
        let head: String = text.chars().take(50).collect();
        let tail: String = text.chars().rev().take(10).collect::<Vec<_>>().into_iter().rev().collect();
        format!("{head}...{tail}")
    } else {
        text.into_owned()
    }
}
