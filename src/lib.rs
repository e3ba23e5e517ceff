//! Subscription Hub
//!
//! A GraphQL server demonstrating real-time event delivery: one published
//! event is fanned out to a changing set of websocket subscribers, each behind
//! its own possibly slow or already-closed connection.
//!
//! # Modules
//!
//! - `ids`: random identifiers for events and subscribers
//! - `event`: the published event type
//! - `broadcast`: the broadcaster actor owning the subscriber registry
//! - `bridge`: per-subscription task forwarding engine output to a transport sink
//! - `engine`: execution engine boundary and the demo `HelloSchema`
//! - `transport`: graphql-ws websocket handler, HTTP router and GraphiQL page
//! - `config`: process and broadcaster configuration
//! - `server`: listener startup
//!
//! # Example
//!
//! ```no_run
//! use subscription_hub::broadcast::Broadcaster;
//! use subscription_hub::config::BroadcasterConfig;
//! use subscription_hub::engine::{HelloSaid, HelloSchema};
//! use subscription_hub::event::Event;
//!
//! # async fn demo() {
//! let broadcaster = Broadcaster::new(BroadcasterConfig::default());
//! let schema = HelloSchema::new(broadcaster.clone());
//! broadcaster.publish(Event::new(HelloSaid { msg: "hi".into() })).await;
//! # let _ = schema;
//! # }
//! ```

pub mod bridge;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod ids;
pub mod server;
pub mod transport;

// Re-export commonly used items at crate root
pub use bridge::{BridgeExit, SubscriptionRequest, TransportSink};
pub use broadcast::Broadcaster;
pub use config::{BroadcasterConfig, Config};
pub use engine::{ExecutionEngine, GraphQLResponse, HelloSchema, Request};
pub use error::{BridgeError, BroadcastError, EngineError, HubResult, TransportError};
pub use event::Event;
pub use ids::{EventId, SubscriberId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
