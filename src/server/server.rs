use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;

use tower_http::services::ServeDir;
use tracing::info;

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use super::catalog_routes::catalog_routes;
use super::delivery_routes::delivery_routes;
use super::http_layers::log_requests;
use super::metrics;
use super::state::ServerState;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub mode: &'static str,
    pub artists: usize,
    pub albums: usize,
    pub songs: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        mode: state.delivery_engine.settings().mode.as_str(),
        artists: state.catalog_store.artist_count(),
        albums: state.catalog_store.album_count(),
        songs: state.catalog_store.song_count(),
    };
    Json(stats)
}

/// Assemble the application router. Exposed so the e2e harness can bind
/// it to an ephemeral port.
pub fn make_app(state: ServerState) -> Router {
    let mut app = Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics::render_metrics))
        .nest("/v1/catalog", catalog_routes())
        .nest("/v1/delivery", delivery_routes());

    if let Some(frontend_dir) = &state.config.frontend_dir_path {
        app = app.fallback_service(ServeDir::new(frontend_dir));
    }

    app.layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub async fn run_server(state: ServerState) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
