use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::{error, warn};

/// Errors a handler can bail out with.
///
/// Validation problems are not errors: they are rendered inline on the form.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing object, or an object the caller may not touch.
    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                Html("<h1>Not Found</h1><p>The requested resource was not found on this server.</p>"),
            )
                .into_response(),
            AppError::BadRequest(reason) => {
                warn!("Bad request: {}", reason);
                (StatusCode::BAD_REQUEST, Html("<h1>Bad Request (400)</h1>")).into_response()
            }
            AppError::Template(e) => {
                error!("Template render failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            AppError::Internal(e) => {
                error!("Internal error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
