//! Domain error types for the Idios command and dispatch layers
//!
//! This module defines all error types using thiserror for structured error
//! handling. Commands raise [`CommandError`]; the work queue transports them
//! as `{exception_type, exception_args}` bodies and clients reconstruct them
//! as [`RpcError`].

use thiserror::Error;

/// Errors raised by the command layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// A client-supplied value violates a contract (bad URL, image too
    /// small, metadata too long, unsupported metric, ...). Maps to HTTP 422.
    #[error("{0}")]
    Parameter(String),

    /// An upstream failure, timeout, or unimplemented path. Maps to HTTP 500.
    #[error("{0}")]
    Server(String),
}

impl CommandError {
    /// Builds a parameter error from any displayable message.
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::Parameter(msg.into())
    }

    /// Builds a server error from any displayable message.
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// The exception name used on the wire for this error.
    ///
    /// Parameter errors travel as `ValueError` and everything else as
    /// `RuntimeError`, matching the dispatcher contract clients decode.
    #[must_use]
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::Parameter(_) => "ValueError",
            Self::Server(_) => "RuntimeError",
        }
    }

    /// Returns true for client-side contract violations.
    #[must_use]
    pub const fn is_parameter(&self) -> bool {
        matches!(self, Self::Parameter(_))
    }
}

/// Result type alias for command operations.
pub type CommandResult<T> = Result<T, CommandError>;

/// The class of an error received over the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// Reconstructed from a `ValueError` on the wire.
    Parameter,
    /// Reconstructed from any other exception type, or raised locally by
    /// the dispatcher itself (timeout, broker failure, malformed reply).
    Server,
}

/// An error returned by a dispatcher call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RpcError {
    /// Whether the remote end classified this as a client mistake.
    pub kind: RpcErrorKind,
    /// Human-readable description, surfaced verbatim to HTTP clients.
    pub message: String,
}

impl RpcError {
    /// Builds a parameter-kind error.
    pub fn parameter(message: impl Into<String>) -> Self {
        Self {
            kind: RpcErrorKind::Parameter,
            message: message.into(),
        }
    }

    /// Builds a server-kind error.
    pub fn server(message: impl Into<String>) -> Self {
        Self {
            kind: RpcErrorKind::Server,
            message: message.into(),
        }
    }

    /// Reconstructs an error from its wire exception name.
    ///
    /// `ValueError` maps to [`RpcErrorKind::Parameter`]; every other name
    /// maps to [`RpcErrorKind::Server`].
    pub fn from_wire(exception_type: &str, message: impl Into<String>) -> Self {
        if exception_type == "ValueError" {
            Self::parameter(message)
        } else {
            Self::server(message)
        }
    }
}

impl From<CommandError> for RpcError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Parameter(msg) => Self::parameter(msg),
            CommandError::Server(msg) => Self::server(msg),
        }
    }
}

impl From<RpcError> for CommandError {
    fn from(err: RpcError) -> Self {
        match err.kind {
            RpcErrorKind::Parameter => Self::Parameter(err.message),
            RpcErrorKind::Server => Self::Server(err.message),
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::Server(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = CommandError::parameter("Images must have their dimensions above 150 x 150 pixels");
        assert_eq!(
            err.to_string(),
            "Images must have their dimensions above 150 x 150 pixels"
        );

        let err = CommandError::server("No response (timeout?)");
        assert_eq!(err.to_string(), "No response (timeout?)");
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(CommandError::parameter("x").wire_name(), "ValueError");
        assert_eq!(CommandError::server("x").wire_name(), "RuntimeError");
    }

    #[test]
    fn test_from_wire_mapping() {
        let err = RpcError::from_wire("ValueError", "bad input");
        assert_eq!(err.kind, RpcErrorKind::Parameter);

        let err = RpcError::from_wire("RuntimeError", "boom");
        assert_eq!(err.kind, RpcErrorKind::Server);

        // Any unknown exception type degrades to a server error.
        let err = RpcError::from_wire("KeyError", "missing");
        assert_eq!(err.kind, RpcErrorKind::Server);
    }

    #[test]
    fn test_round_trip_through_rpc_error() {
        let original = CommandError::parameter("metadata json too long (65536 > 65535)");
        let rpc: RpcError = original.clone().into();
        let back: CommandError = rpc.into();
        assert_eq!(original, back);
    }
}
