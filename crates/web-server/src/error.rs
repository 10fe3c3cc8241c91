use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use database::DbError;
use engine::EngineError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Portfolio error: {0}")]
    Portfolio(#[from] portfolio::PortfolioError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Converts our custom `AppError` into an HTTP response.
///
/// The error taxonomy maps onto status codes: NotFound → 404, Conflict → 409
/// (so the caller can explain "already exists" to the user), Validation →
/// 400, everything else → 500 with the detail kept out of the response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Engine(EngineError::NotFound(what)) => (StatusCode::NOT_FOUND, what),
            AppError::Engine(EngineError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg),
            AppError::Engine(EngineError::Database(DbError::Conflict(what)))
            | AppError::Database(DbError::Conflict(what)) => (
                StatusCode::CONFLICT,
                format!("Already exists: {what}"),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => {
                tracing::error!(error = ?other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
