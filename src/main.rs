//! Subscription Hub - Binary Entry Point
//!
//! Serves GraphiQL on `/` and GraphQL on `/graphql`. The port comes from
//! `HTTP_PORT` (default 8080); log filtering from `RUST_LOG`.

use subscription_hub::config::Config;
use subscription_hub::error::HubResult;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> HubResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, version = subscription_hub::VERSION, "Starting subscription hub");

    subscription_hub::server::run(config, shutdown_signal()).await?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for ctrl+c");
        std::future::pending::<()>().await;
    }
}
