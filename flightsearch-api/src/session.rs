use axum::{
    extract::State,
    routing::{get, post, put},
    Json,
    Router,
};
use flightsearch_core::{AirportRef, SessionSnapshot};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateInputRequest {
    pub text: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/session", get(get_session))
        .route("/v1/session/input", put(update_input))
        .route("/v1/session/input/clear", post(clear_input))
        .route("/v1/session/selection", post(select_airport))
}

/// GET /v1/session
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

/// PUT /v1/session/input
/// Suggestions refresh once the text has been stable for the debounce window.
pub async fn update_input(
    State(state): State<AppState>,
    Json(req): Json<UpdateInputRequest>,
) -> Json<SessionSnapshot> {
    state.session.update_input(req.text);
    Json(state.session.snapshot())
}

/// POST /v1/session/input/clear
pub async fn clear_input(State(state): State<AppState>) -> Json<SessionSnapshot> {
    state.session.on_clear_click();
    Json(state.session.snapshot())
}

/// POST /v1/session/selection
pub async fn select_airport(
    State(state): State<AppState>,
    Json(airport): Json<AirportRef>,
) -> Result<Json<SessionSnapshot>, AppError> {
    if airport.iata_code.trim().is_empty() {
        return Err(AppError::ValidationError("iata_code must not be empty".to_string()));
    }
    state.session.select_airport(airport)?;
    Ok(Json(state.session.snapshot()))
}
