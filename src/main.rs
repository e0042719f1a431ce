// main.rs
mod commands;
mod config;
mod devices;
mod docs;
mod error;
mod events;
mod fleet;
mod handlers;
mod models;
mod telemetry;
mod worker;

use axum::{
    Router,
    routing::{get, post},
};
use devices::PjLinkConnector;
use fleet::Fleet;
use handlers::*;
use models::AppState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("projector_fleet=info")),
        )
        .init();

    let settings = config::Settings::new()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    if settings.metrics.enabled {
        telemetry::setup_metrics(settings.metrics.port)?;
        tracing::info!("Metrics exported on port {}", settings.metrics.port);
    }

    let connector = Arc::new(PjLinkConnector::new(
        settings.fleet.pjlink_port,
        settings.fleet.connect_timeout(),
    ));
    let fleet = Arc::new(Fleet::new(
        settings.fleet.devices.clone(),
        connector,
        settings.fleet.credential.clone(),
        settings.fleet.poll_interval(),
    ));
    fleet.start();

    let state = Arc::new(AppState::new(Arc::clone(&fleet)));

    let app = Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{name}/commands", post(send_command))
        .route("/api/commands", post(broadcast_command))
        .route("/ws/client", get(handle_client_ws_upgrade))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", docs::ApiDoc::openapi()))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.server.address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind address: {}", e))?;

    tracing::info!("Server started on {}", settings.server.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    fleet.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
