pub mod demo;
pub mod open;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::DebugBarError;

// ─── Unified error type ──────────────────────────────────────────

/// HTTP face of [`DebugBarError`]. The library never picks status codes;
/// this is where the server does.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<DebugBarError> for AppError {
    fn from(err: DebugBarError) -> Self {
        match err {
            e if e.is_not_found() => Self::NotFound(e.to_string()),
            e @ DebugBarError::InvalidRequest(_) => Self::BadRequest(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_taxonomy_to_status() {
        let status = |e: DebugBarError| AppError::from(e).into_response().status();
        assert_eq!(status(DebugBarError::RequestNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(DebugBarError::invalid_request("id is required")), StatusCode::BAD_REQUEST);
        assert_eq!(status(DebugBarError::Session("gone".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
