//! Read-only collection browse routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::server::state::{GuardedCatalogStore, ServerState};

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /albums - Paginated album listing
async fn list_albums(
    State(store): State<GuardedCatalogStore>,
    Query(pagination): Query<PaginationQuery>,
) -> Response {
    match store.list_albums(pagination.limit.min(500), pagination.offset) {
        Ok(albums) => Json(albums).into_response(),
        Err(e) => {
            warn!("Failed to list albums: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list albums").into_response()
        }
    }
}

/// GET /albums/{id}
async fn get_album(State(store): State<GuardedCatalogStore>, Path(id): Path<i64>) -> Response {
    match store.get_album(id) {
        Ok(Some(album)) => Json(album).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to get album {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /artists/{id}
async fn get_artist(State(store): State<GuardedCatalogStore>, Path(id): Path<i64>) -> Response {
    match store.get_artist(id) {
        Ok(Some(artist)) => Json(artist).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to get artist {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /artists/{id}/albums
async fn get_artist_albums(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> Response {
    match store.get_artist(id) {
        Ok(Some(_)) => match store.list_artist_albums(id) {
            Ok(albums) => Json(albums).into_response(),
            Err(e) => {
                warn!("Failed to list albums for artist {}: {}", id, e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to get artist {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn catalog_routes() -> Router<ServerState> {
    Router::new()
        .route("/albums", get(list_albums))
        .route("/albums/{id}", get(get_album))
        .route("/artists/{id}", get(get_artist))
        .route("/artists/{id}/albums", get(get_artist_albums))
}
