//! HTTP server setup with Axum

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use super::{connection, graphiql, protocol::SUBPROTOCOL};
use crate::bridge::SubscriptionRequest;
use crate::engine::{error_response, GraphQLResponse, HelloSchema};

/// Shared state for HTTP and websocket handlers
pub struct AppState {
    pub schema: Arc<HelloSchema>,
    /// Port advertised to the GraphiQL page
    pub port: u16,
    pub keep_alive: Duration,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(schema: HelloSchema, port: u16, keep_alive: Duration) -> Self {
        Self {
            schema: Arc::new(schema),
            port,
            keep_alive,
            started_at: Utc::now(),
        }
    }
}

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // GraphiQL demo page
        .route("/", get(graphiql_page))
        // Queries and mutations over POST, subscriptions over graphql-ws
        .route("/graphql", get(ws_handler).post(graphql_handler))
        // Health check
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}

async fn graphiql_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(graphiql::render(state.port))
}

/// POST /graphql - run a query or mutation
async fn graphql_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscriptionRequest>,
) -> Json<GraphQLResponse> {
    let response = match body.decode() {
        Ok(request) => state.schema.execute(&request).await,
        Err(err) => error_response(err.to_string()),
    };
    Json(response)
}

/// GET /graphql - websocket upgrade speaking graphql-ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    if !offers_subprotocol(&headers) {
        return (
            StatusCode::BAD_REQUEST,
            format!("expected the {SUBPROTOCOL} websocket sub-protocol"),
        )
            .into_response();
    }

    let schema = Arc::clone(&state.schema);
    let keep_alive = state.keep_alive;
    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| connection::serve(socket, schema, keep_alive))
}

fn offers_subprotocol(headers: &HeaderMap) -> bool {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|protocol| protocol.trim() == SUBPROTOCOL)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "subscribers": state.schema.broadcaster().subscriber_count().await,
        "started_at": state.started_at.to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::config::BroadcasterConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderValue, Request};
    use tower::util::ServiceExt;

    fn test_router() -> Router {
        let schema = HelloSchema::new(Broadcaster::new(BroadcasterConfig::default()));
        create_router(Arc::new(AppState::new(schema, 8080, Duration::from_secs(20))))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_graphql(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/graphql")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["subscribers"], 0);
    }

    #[tokio::test]
    async fn test_graphiql_page() {
        let response = test_router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("ws://localhost:8080/graphql"));
    }

    #[tokio::test]
    async fn test_post_query() {
        let response = test_router()
            .oneshot(post_graphql(json!({"query": "{ hello }"})))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(body_json(response).await, json!({"data": {"hello": "Hello world!"}}));
    }

    #[tokio::test]
    async fn test_post_mutation_with_variables() {
        let response = test_router()
            .oneshot(post_graphql(json!({
                "query": "mutation Say($msg: String!) { sayHello(msg: $msg) { id msg } }",
                "operationName": "Say",
                "variables": {"msg": "hi"}
            })))
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["data"]["sayHello"]["msg"], "hi");
        assert_eq!(json["data"]["sayHello"]["id"].as_str().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_post_bad_variables() {
        let response = test_router()
            .oneshot(post_graphql(json!({"query": "{ hello }", "variables": [1, 2]})))
            .await
            .unwrap();

        let json = body_json(response).await;
        assert!(json["data"].is_null());
        assert_eq!(json["errors"][0]["message"], "variables must be a JSON object, got an array");
    }

    #[test]
    fn test_subprotocol_detection() {
        let mut headers = HeaderMap::new();
        assert!(!offers_subprotocol(&headers));

        headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("graphql-transport-ws, graphql-ws"));
        assert!(offers_subprotocol(&headers));

        headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("graphql-transport-ws"));
        assert!(!offers_subprotocol(&headers));
    }
}
