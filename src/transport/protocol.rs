//! graphql-ws message types
//!
//! The legacy `subscriptions-transport-ws` protocol, negotiated through the
//! `graphql-ws` websocket sub-protocol.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::bridge::SubscriptionRequest;

/// Websocket sub-protocol name
pub const SUBPROTOCOL: &str = "graphql-ws";

/// Client → server messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    /// Start an operation under a client-chosen id
    Start {
        id: String,
        payload: SubscriptionRequest,
    },

    Stop {
        id: String,
    },

    ConnectionTerminate,
}

/// Error body carried by `error` and `connection_error`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Server → client messages
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,

    ConnectionError {
        payload: ErrorPayload,
    },

    /// Keep-alive
    #[serde(rename = "ka")]
    KeepAlive,

    /// One result for an operation; payload is already-serialized JSON
    Data {
        id: String,
        payload: Box<RawValue>,
    },

    Error {
        id: String,
        payload: ErrorPayload,
    },

    Complete {
        id: String,
    },
}

impl ServerMessage {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
