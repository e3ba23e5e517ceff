//! Error types for the subscription hub
//!
//! Each layer has its own error enum; the binary entry point collapses
//! everything into [`HubResult`].

use std::time::Duration;

use thiserror::Error;

/// Result type for process-level operations
pub type HubResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Errors returned by the broadcaster handle
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    /// The serial loop did not accept the registration within the bound
    #[error("broadcaster busy: registration not accepted within {0:?}")]
    RegisterTimeout(Duration),

    /// The serial loop has shut down
    #[error("broadcaster closed")]
    Closed,
}

/// Errors raised by the execution engine before a subscription starts
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{0}")]
    Validation(String),
}

/// Errors surfaced once when a subscription bridge cannot start
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("variables must be a JSON object, got {0}")]
    InvalidVariables(&'static str),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors from delivering a message to a transport connection
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("invalid message payload: {0}")]
    InvalidPayload(String),
}

/// Errors loading process configuration
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid HTTP_PORT {value:?}: {reason}")]
    InvalidPort { value: String, reason: String },
}
