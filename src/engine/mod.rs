//! Execution engine boundary
//!
//! The bridge only knows the [`ExecutionEngine`] trait: hand it a request and
//! a cancellation token, get back a stream of serializable responses.
//! [`HelloSchema`] is the demo schema served by the binary.

pub mod hello;

use async_graphql::ServerError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

pub use hello::{HelloSaid, HelloSaidEvent, HelloSchema};

/// Variable bindings, already decoded from the transport payload
pub type Variables = Map<String, Value>;

/// Responses produced over the lifetime of one subscription
pub type ResponseStream<R> = BoxStream<'static, R>;

/// A request ready for execution
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Variables,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// Engine that turns a request into a sequence of responses
#[async_trait]
pub trait ExecutionEngine: Send + Sync + 'static {
    type Response: Serialize + Send + 'static;

    /// Start executing `request`
    ///
    /// The returned stream ends when the engine considers the subscription
    /// exhausted. Cancelling `cancel` must release whatever the engine holds
    /// for this request.
    async fn subscribe(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> Result<ResponseStream<Self::Response>, EngineError>;
}

/// Standard GraphQL response body
pub type GraphQLResponse = async_graphql::Response;

/// Deepest bracket nesting accepted in a query document
pub const MAX_DEPTH: usize = 64;

/// Response carrying a single error and no data
pub fn error_response(message: impl Into<String>) -> GraphQLResponse {
    GraphQLResponse::from_errors(vec![ServerError::new(message, None)])
}

/// Reject documents nested deeper than [`MAX_DEPTH`] before parsing them
///
/// Counts `{`, `[` and `(` outside strings and comments. Parsers recurse on
/// each of these, so an unbounded document could exhaust the stack.
pub fn check_depth(query: &str) -> Result<(), EngineError> {
    const BLOCK_QUOTE: &[u8] = b"\"\"\"";

    let bytes = query.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'"' if bytes[i..].starts_with(BLOCK_QUOTE) => {
                i += BLOCK_QUOTE.len();
                while i < bytes.len() && !bytes[i..].starts_with(BLOCK_QUOTE) {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
                i += BLOCK_QUOTE.len() - 1;
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' && bytes[i] != b'\n' {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
            }
            b'{' | b'[' | b'(' => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(EngineError::Syntax(format!(
                        "document nests deeper than {MAX_DEPTH} levels"
                    )));
                }
            }
            b'}' | b']' | b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    Ok(())
}
