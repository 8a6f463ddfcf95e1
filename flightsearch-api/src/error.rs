use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flightsearch_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Anyhow(err) => match err.downcast_ref::<CoreError>() {
                Some(CoreError::InvalidTransition { .. }) | Some(CoreError::SelfRoute(_)) => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                },
                Some(CoreError::Store(_)) => {
                    tracing::warn!("Store unavailable: {}", err);
                    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
                },
                None => {
                    tracing::error!("Internal Server Error: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
                },
            },
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}
