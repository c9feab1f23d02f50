use axum::{
    Router,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{services, state::AppState};
use crate::config::Config;
use crate::relay::RelayStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the coordinator router. Split out from [`run`] so tests can drive
/// it without binding a socket.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/nodes/register", post(services::register_node))
        .route("/nodes", get(services::list_nodes))
        .route("/nodes/{node_id}/events", get(services::node_events))
        .route("/nodes/{node_id}/tasks", get(services::node_tasks))
        .route("/tasks/assign", post(services::assign_task))
        .route("/tasks/success", post(services::notify_success))
        .route("/tasks/reassign", post(services::reassign_task))
        .route("/tasks/notify", post(services::notify_node))
        .route("/tasks", get(services::get_task))
        .route(
            "/relay",
            put(services::upload_artifact).get(services::download_artifact),
        )
        .route("/health", get(services::health))
        .with_state(state)
        // Accept gzip/deflate-compressed uploads transparently
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let address = config.coordinator.bind_addr;

    info!(path = %config.coordinator.relay_dir.display(), "Opening relay store");
    let relay = RelayStore::local(&config.coordinator.relay_dir)
        .map_err(|e| format!("Failed to open relay store: {}", e))?;

    let state = AppState::new(config, relay);
    let app = build_router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Coordinator listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
