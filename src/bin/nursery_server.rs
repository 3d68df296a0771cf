// Nursery Locator server entry point
//
// Usage: cargo run --bin nursery_server
// Configuration comes from the environment (CATALOG_PATH, BOUNDARY_PATH, PORT, ...)

use nursery_locator::{create_router, AppState, ServerConfig};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (structured logging)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    // Default log level: info for our crate, warn for others
                    "nursery_locator=info,nursery_server=info,tower_http=debug,axum=debug,warn".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting nursery locator...");

    let config = ServerConfig::from_env()?;
    config.log();
    let port = config.port;

    // Catalog schema errors stop the server here
    let state = AppState::new(config)?;
    tracing::info!("Application state initialized ({} nurseries)", state.catalog.len());

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .await?;

    Ok(())
}
