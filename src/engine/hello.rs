//! The demo schema
//!
//! ```graphql
//! type Query        { hello: String! }
//! type Mutation     { sayHello(msg: String!): HelloSaidEvent! }
//! type Subscription { helloSaid: HelloSaidEvent! }
//! type HelloSaidEvent { id: String!  msg: String! }
//! ```
//!
//! Parsing, validation and field projection are done by `async-graphql`.
//! `helloSaid` streams whatever the broadcaster delivers to the subscriber
//! it registers.

use async_graphql::parser::{parse_query, types::OperationType};
use async_graphql::{Context, Object, Schema, Subscription};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{check_depth, error_response, ExecutionEngine, GraphQLResponse, Request, ResponseStream, MAX_DEPTH};
use crate::broadcast::Broadcaster;
use crate::error::EngineError;
use crate::event::Event;

/// Payload of a `helloSaid` event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HelloSaid {
    pub msg: String,
}

pub type HelloSaidEvent = Event<HelloSaid>;

type Root = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Resolver for the demo schema, backed by a broadcaster of `helloSaid` events
#[derive(Clone)]
pub struct HelloSchema {
    schema: Root,
    broadcaster: Broadcaster<HelloSaidEvent>,
}

impl HelloSchema {
    pub fn new(broadcaster: Broadcaster<HelloSaidEvent>) -> Self {
        let schema = Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
            .data(broadcaster.clone())
            .limit_recursive_depth(MAX_DEPTH)
            .finish();
        Self { schema, broadcaster }
    }

    pub fn broadcaster(&self) -> &Broadcaster<HelloSaidEvent> {
        &self.broadcaster
    }

    /// Run a query or mutation and return its single response
    ///
    /// Subscriptions are rejected here; they need a graphql-ws connection.
    pub async fn execute(&self, request: &Request) -> GraphQLResponse {
        if let Err(err) = check_depth(&request.query) {
            return error_response(err.to_string());
        }
        self.schema.execute(graphql_request(request)).await
    }
}

#[async_trait]
impl ExecutionEngine for HelloSchema {
    type Response = GraphQLResponse;

    async fn subscribe(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> Result<ResponseStream<GraphQLResponse>, EngineError> {
        let kind = operation_type(&request)?;
        let (started, started_rx) = oneshot::channel();
        let graphql_request = graphql_request(&request)
            .data(cancel)
            .data(Started(Mutex::new(Some(started))));
        let mut stream = self.schema.execute_stream(graphql_request).boxed();

        if matches!(kind, Some(OperationType::Query | OperationType::Mutation)) {
            return Ok(stream);
        }

        // A subscription either reaches its resolver, which signals once the
        // subscriber is registered, or fails and yields its errors first.
        let rejected = tokio::select! {
            biased;
            Ok(()) = started_rx => None,
            first = stream.next() => Some(first),
        };
        match rejected {
            None => Ok(stream),
            Some(first) => Err(rejection(first)),
        }
    }
}

/// Fired by `helloSaid` once its subscriber is in the registry
struct Started(Mutex<Option<oneshot::Sender<()>>>);

impl Started {
    fn notify(&self) {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(());
        }
    }
}

struct QueryRoot;

#[Object(name = "Query")]
impl QueryRoot {
    async fn hello(&self) -> String {
        "Hello world!".to_string()
    }
}

struct MutationRoot;

#[Object(name = "Mutation")]
impl MutationRoot {
    async fn say_hello(&self, ctx: &Context<'_>, msg: String) -> async_graphql::Result<HelloSaidObject> {
        let broadcaster = ctx.data::<Broadcaster<HelloSaidEvent>>()?;
        let event = Event::new(HelloSaid { msg });
        publish_detached(broadcaster, event.clone());
        Ok(HelloSaidObject(event))
    }
}

struct SubscriptionRoot;

#[Subscription(name = "Subscription")]
impl SubscriptionRoot {
    async fn hello_said(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<impl Stream<Item = HelloSaidObject>> {
        let broadcaster = ctx.data::<Broadcaster<HelloSaidEvent>>()?.clone();
        let cancel = ctx.data_opt::<CancellationToken>().cloned().unwrap_or_default();

        let (sink, mut events) = mpsc::channel(1);
        let subscriber_id = broadcaster.register(sink, cancel.clone()).await?;
        if let Some(started) = ctx.data_opt::<Started>() {
            started.notify();
        }

        Ok(async_stream::stream! {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    event = events.recv() => event,
                };
                let Some(event) = next else { break };
                yield HelloSaidObject(event);
            }
            broadcaster.unregister(&subscriber_id);
        })
    }
}

struct HelloSaidObject(HelloSaidEvent);

#[Object(name = "HelloSaidEvent")]
impl HelloSaidObject {
    async fn id(&self) -> String {
        self.0.id.to_string()
    }

    async fn msg(&self) -> String {
        self.0.payload.msg.clone()
    }
}

/// Hand the event to the broadcaster without holding up the mutation
fn publish_detached(broadcaster: &Broadcaster<HelloSaidEvent>, event: HelloSaidEvent) {
    tracing::info!(event_id = %event.id, msg = %event.payload.msg, "Hello said");
    let broadcaster = broadcaster.clone();
    tokio::spawn(async move {
        broadcaster.publish(event).await;
    });
}

fn graphql_request(request: &Request) -> async_graphql::Request {
    let variables = async_graphql::Variables::from_json(Value::Object(request.variables.clone()));
    let graphql_request = async_graphql::Request::new(request.query.clone()).variables(variables);
    match request.operation_name.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => graphql_request.operation_name(name),
        None => graphql_request,
    }
}

/// Kind of the operation `request` selects, if it selects exactly one
fn operation_type(request: &Request) -> Result<Option<OperationType>, EngineError> {
    check_depth(&request.query)?;
    let document = parse_query(&request.query).map_err(|err| EngineError::Syntax(err.to_string()))?;

    let wanted = request.operation_name.as_deref().filter(|name| !name.is_empty());
    let mut matching = document
        .operations
        .iter()
        .filter(|(name, _)| wanted.is_none() || name.map(|name| name.as_str()) == wanted);
    Ok(match (matching.next(), matching.next()) {
        (Some((_, operation)), None) => Some(operation.node.ty),
        _ => None,
    })
}

fn rejection(first: Option<GraphQLResponse>) -> EngineError {
    let message = first
        .map(|response| {
            response
                .errors
                .into_iter()
                .map(|err| err.message)
                .collect::<Vec<_>>()
                .join("; ")
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| "subscription ended before it started".to_string());
    EngineError::Validation(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BroadcasterConfig;
    use crate::ids::EventId;
    use serde_json::json;
    use std::time::Duration;

    fn schema() -> HelloSchema {
        HelloSchema::new(Broadcaster::new(BroadcasterConfig::default()))
    }

    fn to_json(response: &GraphQLResponse) -> Value {
        serde_json::to_value(response).unwrap()
    }

    async fn wait_for_subscribers(schema: &HelloSchema, n: usize) {
        for _ in 0..100 {
            if schema.broadcaster().subscriber_count().await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} subscribers");
    }

    #[tokio::test]
    async fn test_hello_query() {
        let resp = schema().execute(&Request::new("{ hello }")).await;
        assert_eq!(to_json(&resp), json!({"data": {"hello": "Hello world!"}}));
    }

    #[tokio::test]
    async fn test_typename_and_alias() {
        let resp = schema().execute(&Request::new("query { t: __typename greeting: hello }")).await;
        assert_eq!(to_json(&resp), json!({"data": {"t": "Query", "greeting": "Hello world!"}}));
    }

    #[tokio::test]
    async fn test_unknown_field_is_a_validation_error() {
        let resp = schema().execute(&Request::new("{ goodbye }")).await;
        assert_eq!(resp.errors.len(), 1);
        assert!(resp.errors[0].message.contains("\"goodbye\""), "{}", resp.errors[0].message);
    }

    #[tokio::test]
    async fn test_say_hello_returns_selected_fields() {
        let mut vars = crate::engine::Variables::new();
        vars.insert("msg".into(), json!("hi"));
        let request = Request::new("mutation($msg: String!) { sayHello(msg: $msg) { msg __typename } }")
            .with_variables(vars);

        let resp = schema().execute(&request).await;
        assert_eq!(
            to_json(&resp),
            json!({"data": {"sayHello": {"msg": "hi", "__typename": "HelloSaidEvent"}}})
        );
    }

    #[tokio::test]
    async fn test_say_hello_requires_string_msg() {
        let missing = schema().execute(&Request::new("mutation { sayHello { id } }")).await;
        assert!(!missing.errors.is_empty());
        assert_eq!(to_json(&missing)["data"], Value::Null);

        let wrong = schema().execute(&Request::new("mutation { sayHello(msg: 3) { id } }")).await;
        assert!(!wrong.errors.is_empty());
    }

    #[tokio::test]
    async fn test_subscription_rejected_over_execute() {
        let schema = schema();
        let resp = schema.execute(&Request::new("subscription { helloSaid { id } }")).await;
        assert_eq!(resp.errors.len(), 1);
        assert_eq!(schema.broadcaster().subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_deeply_nested_document_is_rejected() {
        let schema = schema();
        let query = format!("{{ hello(a: {}{}) }}", "[".repeat(100_000), "]".repeat(100_000));

        let resp = schema.execute(&Request::new(query.clone())).await;
        assert!(resp.errors[0].message.contains("nests deeper"));

        let err = schema
            .subscribe(Request::new(query), CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Syntax(_)));
    }

    #[tokio::test]
    async fn test_subscribe_reports_syntax_errors() {
        let err = schema()
            .subscribe(Request::new("subscription { helloSaid {"), CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Syntax(_)));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_unknown_field_without_registering() {
        let schema = schema();
        let err = schema
            .subscribe(Request::new("subscription { goodbye }"), CancellationToken::new())
            .await
            .err()
            .unwrap();

        match err {
            EngineError::Validation(message) => assert!(message.contains("\"goodbye\""), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(schema.broadcaster().subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_rejects_unknown_operation_name() {
        let request = Request::new("subscription A { helloSaid { id } }").with_operation_name("B");
        let err = schema()
            .subscribe(request, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_query_over_subscribe_yields_once() {
        let mut stream = schema()
            .subscribe(Request::new("{ hello }"), CancellationToken::new())
            .await
            .unwrap();

        let resp = stream.next().await.unwrap();
        assert_eq!(to_json(&resp), json!({"data": {"hello": "Hello world!"}}));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_streams_published_events() {
        let schema = schema();
        let cancel = CancellationToken::new();
        let mut stream = schema
            .subscribe(Request::new("subscription { helloSaid { id msg } }"), cancel.clone())
            .await
            .unwrap();

        // Registered by the time subscribe returns
        let event = Event::with_id(EventId::from_raw("e1"), HelloSaid { msg: "hi".into() });
        assert!(schema.broadcaster().publish(event).await);

        let resp = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(to_json(&resp), json!({"data": {"helloSaid": {"id": "e1", "msg": "hi"}}}));

        cancel.cancel();
        assert!(stream.next().await.is_none());
        wait_for_subscribers(&schema, 0).await;
    }

    #[tokio::test]
    async fn test_mutation_reaches_subscribers() {
        let schema = schema();
        let mut stream = schema
            .subscribe(
                Request::new("subscription { said: helloSaid { msg } }"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        schema
            .execute(&Request::new("mutation { sayHello(msg: \"from mutation\") { id } }"))
            .await;

        let resp = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(to_json(&resp), json!({"data": {"said": {"msg": "from mutation"}}}));
    }
}
