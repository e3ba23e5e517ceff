//! Transport layer
//!
//! A single `/graphql` path serves both surfaces:
//! - `POST /graphql` - queries and mutations as plain JSON
//! - `GET /graphql` - websocket upgrade negotiating the `graphql-ws` sub-protocol
//!
//! `GET /` serves a GraphiQL page and `GET /health` a liveness probe.

pub mod connection;
pub mod graphiql;
pub mod http;
pub mod protocol;

pub use connection::OperationSink;
pub use http::{create_router, AppState};
pub use protocol::{ClientMessage, ServerMessage, SUBPROTOCOL};
