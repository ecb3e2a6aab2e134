pub mod handlers;

use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// Build the `/api` router over `state`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/peers", get(handlers::handle_peers))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve the API on 127.0.0.1:`port` until `shutdown` fires.
pub async fn serve(
    state: ApiState,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    tracing::info!("API stopped");
    Ok(())
}
