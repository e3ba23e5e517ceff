//! Server startup

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::engine::HelloSchema;
use crate::transport::{create_router, AppState};

/// Handle returned by [`start`]; keeps the server task alive
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub schema: HelloSchema,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Bind the listener and serve in the background
///
/// Port 0 picks a free port; the bound address is on the handle.
pub async fn start(config: Config) -> std::io::Result<ServerHandle> {
    let (listener, schema, app) = bind(&config).await?;
    let addr = listener.local_addr()?;

    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "Server stopped");
        }
    });

    Ok(ServerHandle { addr, schema, task })
}

/// Serve in the foreground until `shutdown` resolves
pub async fn run(config: Config, shutdown: impl Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
    let (listener, _schema, app) = bind(&config).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn bind(config: &Config) -> std::io::Result<(tokio::net::TcpListener, HelloSchema, axum::Router)> {
    let schema = HelloSchema::new(Broadcaster::new(config.broadcaster.clone()));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    let local_addr = listener.local_addr()?;

    let state = AppState::new(schema.clone(), local_addr.port(), config.keep_alive);
    let app = create_router(Arc::new(state));

    tracing::info!(port = local_addr.port(), "Listening for GraphQL on /graphql");
    Ok((listener, schema, app))
}
