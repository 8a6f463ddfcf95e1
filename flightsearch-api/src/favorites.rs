use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json,
    Router,
};
use flightsearch_core::FavoritePair;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ToggleFavoriteRequest {
    pub departure_code: String,
    pub destination_code: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleFavoriteResponse {
    pub departure_code: String,
    pub destination_code: String,
    pub favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct RefreshFavoritesResponse {
    pub raised: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/favorites", get(list_favorites))
        .route("/v1/favorites/toggle", post(toggle_favorite))
        .route("/v1/favorites/refresh", post(refresh_favorites))
        .route("/v1/favorites/failures/stream", get(stream_write_failures))
}

/// GET /v1/favorites
/// Every saved route, read from the store
pub async fn list_favorites(
    State(state): State<AppState>,
) -> Result<Json<Vec<FavoritePair>>, AppError> {
    let favorites = state.session.stored_favorites().await?;
    Ok(Json(favorites))
}

/// POST /v1/favorites/toggle
/// The flag flips immediately; the store write happens in the background.
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Json(req): Json<ToggleFavoriteRequest>,
) -> Result<Json<ToggleFavoriteResponse>, AppError> {
    let pair = FavoritePair::new(req.departure_code, req.destination_code)
        .ok_or_else(|| AppError::ValidationError("Departure and destination must differ".to_string()))?;

    let favorite = state.session.toggle_favorite(&pair)?;

    Ok(Json(ToggleFavoriteResponse {
        departure_code: pair.departure_code,
        destination_code: pair.destination_code,
        favorite,
    }))
}

/// POST /v1/favorites/refresh
pub async fn refresh_favorites(
    State(state): State<AppState>,
) -> Result<Json<RefreshFavoritesResponse>, AppError> {
    let raised = state.session.refresh_favorites().await?;
    Ok(Json(RefreshFavoritesResponse { raised }))
}

/// GET /v1/favorites/failures/stream
/// Durable writes that failed after the optimistic update
pub async fn stream_write_failures(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.session.write_failures();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(failure) => Some(Event::default().event("write_failure").json_data(&failure)),
            Err(e) => {
                tracing::warn!("Write failure stream lagged: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
