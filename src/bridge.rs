//! Subscription bridge
//!
//! Connects one engine response stream to one transport sink. Each started
//! subscription gets exactly one forwarding task, which runs until the
//! engine's stream ends or the sink's done signal fires.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::{ExecutionEngine, Request, ResponseStream, Variables};
use crate::error::{BridgeError, TransportError};

/// Sent in place of a response that could not be serialized
pub const MARSHAL_ERROR: &[u8] = br#"{"errors":["internal error: can't marshal response into json"]}"#;

/// Outbound side of one subscription
#[async_trait]
pub trait TransportSink: Send + Sync + 'static {
    /// Deliver one serialized message; may wait on the transport
    async fn send(&self, message: Vec<u8>) -> Result<(), TransportError>;

    /// Fires once the subscription is no longer wanted
    fn done(&self) -> CancellationToken;

    /// Called once when the engine ends the stream on its own
    async fn complete(&self) {}
}

/// Subscription request as received from the transport, variables still raw
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

impl SubscriptionRequest {
    /// Decode into the engine's request representation
    pub fn decode(self) -> Result<Request, BridgeError> {
        Ok(Request {
            query: self.query,
            operation_name: self.operation_name.filter(|name| !name.is_empty()),
            variables: decode_variables(self.variables)?,
        })
    }
}

/// Decode untyped variables into engine bindings
///
/// Absent or `null` means no variables; anything but an object is rejected.
pub fn decode_variables(raw: Option<Value>) -> Result<Variables, BridgeError> {
    match raw {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::Bool(_)) => Err(BridgeError::InvalidVariables("a boolean")),
        Some(Value::Number(_)) => Err(BridgeError::InvalidVariables("a number")),
        Some(Value::String(_)) => Err(BridgeError::InvalidVariables("a string")),
        Some(Value::Array(_)) => Err(BridgeError::InvalidVariables("an array")),
    }
}

/// How a forwarding task ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeExit {
    /// The engine's stream ended
    Exhausted,
    /// The sink's done signal fired
    Cancelled,
}

/// Start a subscription and spawn its forwarding task
///
/// Errors from decoding or from the engine are returned here, once; in that
/// case nothing is spawned and the sink is never written to.
pub async fn start<E, S>(
    engine: &E,
    request: SubscriptionRequest,
    sink: S,
) -> Result<JoinHandle<BridgeExit>, BridgeError>
where
    E: ExecutionEngine + ?Sized,
    S: TransportSink,
{
    let request = request.decode()?;
    let execution = sink.done().child_token();

    let stream = match engine.subscribe(request, execution.clone()).await {
        Ok(stream) => stream,
        Err(err) => {
            execution.cancel();
            return Err(err.into());
        }
    };

    Ok(tokio::spawn(forward(stream, sink, execution)))
}

async fn forward<R, S>(
    mut stream: ResponseStream<R>,
    sink: S,
    execution: CancellationToken,
) -> BridgeExit
where
    R: Serialize + Send + 'static,
    S: TransportSink,
{
    // Releases the engine's work however this task ends
    let _release = execution.clone().drop_guard();

    loop {
        let next = tokio::select! {
            biased;
            _ = execution.cancelled() => return BridgeExit::Cancelled,
            item = stream.next() => item,
        };
        let Some(response) = next else {
            sink.complete().await;
            return BridgeExit::Exhausted;
        };

        let message = match serde_json::to_vec(&response) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to serialize response");
                MARSHAL_ERROR.to_vec()
            }
        };

        tokio::select! {
            biased;
            _ = execution.cancelled() => return BridgeExit::Cancelled,
            sent = sink.send(message) => {
                if let Err(err) = sent {
                    tracing::debug!(error = %err, "Transport send failed");
                }
            }
        }
    }
}
