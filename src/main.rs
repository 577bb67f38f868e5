//! ws-hub server entry point.
//!
//! Starts the Axum HTTP server with the WebSocket upgrade route, the admin
//! endpoints, and the supervised liveness monitor.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ws_hub::api;
use ws_hub::app_state::AppState;
use ws_hub::config::{HubConfig, LogFormat};
use ws_hub::hub::Hub;
use ws_hub::supervisor::supervise;
use ws_hub::ws::echo::echo_handler;
use ws_hub::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = HubConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, path = %config.ws_path, "starting ws-hub");

    // Build the hub
    let hub = Hub::builder()
        .settings(config.hub_settings())
        .on_removal(|meta| {
            tracing::debug!(conn_id = %meta.id, last_activity = %meta.last_activity, "connection removed");
        })
        .build();
    if config.echo_enabled {
        hub.register_handler(echo_handler(hub.clone()));
        tracing::info!("echo handler enabled");
    }
    let _monitor = hub.spawn_monitor(config.restart_backoff);

    // Build application state
    let app_state = AppState {
        hub,
        max_message_bytes: config.max_message_bytes,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route(&config.ws_path, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Serve, restarting after a fixed backoff on failure
    let listen_addr = config.listen_addr;
    supervise("http-server", config.restart_backoff, move || {
        let app = app.clone();
        async move {
            let listener = tokio::net::TcpListener::bind(listen_addr).await?;
            tracing::info!(addr = %listen_addr, "server listening");
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
        }
    })
    .await;

    Ok(())
}
