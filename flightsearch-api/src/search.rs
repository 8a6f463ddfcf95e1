use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::get,
    Json,
    Router,
};
use flightsearch_core::{AirportRef, FavoritePair, Lookup};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FlightsResponse {
    pub origin: Option<AirportRef>,
    pub flights: Vec<FlightResponse>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlightResponse {
    pub destination: AirportRef,
    pub favorite: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/suggestions", get(get_suggestions))
        .route("/v1/suggestions/stream", get(stream_suggestions))
        .route("/v1/flights", get(get_flights))
        .route("/v1/flights/stream", get(stream_flights))
}

/// GET /v1/suggestions
/// Latest debounced suggestions for the current input
pub async fn get_suggestions(State(state): State<AppState>) -> Json<Lookup> {
    let lookup = state.session.suggestions().borrow().clone();
    Json(lookup)
}

/// GET /v1/suggestions/stream
pub async fn stream_suggestions(State(state): State<AppState>) -> impl IntoResponse {
    lookup_events(state.session.suggestions())
}

/// GET /v1/flights
/// Destinations from the selected airport, with favorite flags
pub async fn get_flights(State(state): State<AppState>) -> Json<FlightsResponse> {
    let session = &state.session;
    let lookup = session.possible_flights().borrow().clone();
    let origin = session.selection();

    let flights = lookup
        .airports()
        .iter()
        .map(|destination| {
            let favorite = origin
                .as_ref()
                .and_then(|o| FavoritePair::route(o, destination))
                .map(|pair| session.is_favorite(&pair))
                .unwrap_or(false);
            FlightResponse {
                destination: destination.clone(),
                favorite,
            }
        })
        .collect();

    let error = match lookup {
        Lookup::Failed(message) => Some(message),
        Lookup::Ready(_) => None,
    };

    Json(FlightsResponse { origin, flights, error })
}

/// GET /v1/flights/stream
pub async fn stream_flights(State(state): State<AppState>) -> impl IntoResponse {
    lookup_events(state.session.possible_flights())
}

fn lookup_events(rx: watch::Receiver<Lookup>) -> impl IntoResponse {
    let stream = WatchStream::new(rx)
        .map(|lookup| Event::default().event("lookup").json_data(&lookup));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
