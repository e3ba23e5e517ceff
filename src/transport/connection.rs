//! graphql-ws connection handler
//!
//! One reader loop per socket plus a writer task draining the outbound
//! queue. Every `start` becomes a subscription bridge whose done signal is a
//! child of the connection's token, so closing the socket cancels them all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::protocol::{ClientMessage, ErrorPayload, ServerMessage};
use crate::bridge::{self, SubscriptionRequest, TransportSink};
use crate::engine::ExecutionEngine;
use crate::error::TransportError;

/// Outbound frames buffered per connection
const OUTBOUND_QUEUE: usize = 64;

/// Live operations on one connection, keyed by client id
///
/// Each entry carries a generation so a finished operation only removes
/// itself, never a newer one reusing the same id.
type Operations = Arc<Mutex<HashMap<String, (u64, CancellationToken)>>>;

/// Drive one websocket connection until it closes
pub async fn serve<E: ExecutionEngine>(socket: WebSocket, engine: Arc<E>, keep_alive: Duration) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut connection = Connection {
        engine,
        outbound,
        token: CancellationToken::new(),
        operations: Arc::new(Mutex::new(HashMap::new())),
        next_generation: 0,
        keep_alive,
        keep_alive_started: false,
    };
    tracing::info!("graphql-ws client connected");

    while let Some(frame) = ws_rx.next().await {
        let keep_going = match frame {
            Ok(Message::Text(text)) => connection.handle_text(&text).await,
            Ok(Message::Close(_)) => false,
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "Websocket read failed");
                false
            }
        };
        if !keep_going {
            break;
        }
    }

    let active = connection.operations.lock().len();
    connection.token.cancel();
    drop(connection);
    tracing::info!(operations = active, "graphql-ws client disconnected");

    // Writer ends once every operation sink has let go of the queue
    let _ = writer.await;
}

struct Connection<E> {
    engine: Arc<E>,
    outbound: mpsc::Sender<String>,
    token: CancellationToken,
    operations: Operations,
    next_generation: u64,
    keep_alive: Duration,
    keep_alive_started: bool,
}

impl<E: ExecutionEngine> Connection<E> {
    /// Returns `false` when the client asked to terminate
    async fn handle_text(&mut self, text: &str) -> bool {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "Invalid graphql-ws message");
                let payload = ErrorPayload::new(format!("invalid message: {err}"));
                self.push(ServerMessage::ConnectionError { payload }).await;
                return true;
            }
        };

        match message {
            ClientMessage::ConnectionInit { .. } => {
                self.push(ServerMessage::ConnectionAck).await;
                self.start_keep_alive().await;
            }
            ClientMessage::Start { id, payload } => self.start_operation(id, payload).await,
            ClientMessage::Stop { id } => self.stop_operation(&id),
            ClientMessage::ConnectionTerminate => return false,
        }
        true
    }

    async fn push(&self, message: ServerMessage) {
        match message.to_text() {
            Ok(text) => {
                let _ = self.outbound.send(text).await;
            }
            Err(err) => tracing::warn!(error = %err, "Failed to encode server message"),
        }
    }

    async fn start_keep_alive(&mut self) {
        if self.keep_alive_started {
            return;
        }
        self.keep_alive_started = true;
        self.push(ServerMessage::KeepAlive).await;

        let outbound = self.outbound.clone();
        let token = self.token.clone();
        let period = self.keep_alive;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Ok(text) = ServerMessage::KeepAlive.to_text() else { break };
                        if outbound.send(text).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn start_operation(&mut self, id: String, request: SubscriptionRequest) {
        let done = self.token.child_token();
        let generation = self.next_generation;
        self.next_generation += 1;

        let previous = self
            .operations
            .lock()
            .insert(id.clone(), (generation, done.clone()));
        if let Some((_, previous)) = previous {
            tracing::debug!(operation_id = %id, "Operation id reused, stopping previous");
            previous.cancel();
        }

        let sink = OperationSink {
            id: id.clone(),
            generation,
            outbound: self.outbound.clone(),
            done,
            operations: Arc::clone(&self.operations),
        };

        match bridge::start(self.engine.as_ref(), request, sink).await {
            Ok(_forwarding) => tracing::debug!(operation_id = %id, "Operation started"),
            Err(err) => {
                tracing::debug!(operation_id = %id, error = %err, "Operation rejected");
                remove_operation(&self.operations, &id, generation);
                let payload = ErrorPayload::new(err.to_string());
                self.push(ServerMessage::Error { id, payload }).await;
            }
        }
    }

    fn stop_operation(&self, id: &str) {
        if let Some((_, done)) = self.operations.lock().remove(id) {
            tracing::debug!(operation_id = %id, "Operation stopped");
            done.cancel();
        }
    }
}

fn remove_operation(operations: &Operations, id: &str, generation: u64) {
    let mut operations = operations.lock();
    if operations.get(id).is_some_and(|(current, _)| *current == generation) {
        operations.remove(id);
    }
}

/// Transport sink for one operation on a connection
pub struct OperationSink {
    id: String,
    generation: u64,
    outbound: mpsc::Sender<String>,
    done: CancellationToken,
    operations: Operations,
}

#[async_trait]
impl TransportSink for OperationSink {
    async fn send(&self, message: Vec<u8>) -> Result<(), TransportError> {
        let json = String::from_utf8(message).map_err(|e| TransportError::InvalidPayload(e.to_string()))?;
        let payload = RawValue::from_string(json).map_err(|e| TransportError::InvalidPayload(e.to_string()))?;
        let text = ServerMessage::Data {
            id: self.id.clone(),
            payload,
        }
        .to_text()
        .map_err(|e| TransportError::InvalidPayload(e.to_string()))?;

        self.outbound.send(text).await.map_err(|_| TransportError::Closed)
    }

    fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    async fn complete(&self) {
        remove_operation(&self.operations, &self.id, self.generation);
        if let Ok(text) = (ServerMessage::Complete { id: self.id.clone() }).to_text() {
            let _ = self.outbound.send(text).await;
        }
    }
}
