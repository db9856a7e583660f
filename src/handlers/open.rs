use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::debugbar::DebugBar;
use crate::http::SessionHttpDriver;
use crate::middleware::debugbar::session_id_from;
use crate::open_handler::{OpenHandler, OpenRequest};
use crate::server::AppState;

use super::AppError;

// ─── GET /_debugbar/open ─────────────────────────────────────────

pub async fn open(
    State(state): State<Arc<AppState>>,
    Query(request): Query<OpenRequest>,
) -> Result<Json<Value>, AppError> {
    let storage = state
        .storage
        .clone()
        .ok_or_else(|| AppError::BadRequest("storage is disabled".into()))?;

    let value = OpenHandler::new(storage).handle_value(&request).await?;
    Ok(Json(value))
}

// ─── GET /_debugbar/stacked ──────────────────────────────────────

/// Drains the caller's stacked batch. Clients without a session cookie
/// get an empty object.
pub async fn stacked(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let Some(sid) = session_id_from(&headers) else {
        return Ok(Json(Value::Object(Default::default())));
    };

    let driver = Arc::new(SessionHttpDriver::new(state.sessions.clone(), Some(sid)));
    let mut bar = DebugBar::new(state.config.clone()).with_http_driver(driver);
    if let Some(storage) = &state.storage {
        bar = bar.with_storage(storage.clone());
    }

    let batch = bar.get_stacked_data().await?;
    Ok(Json(Value::Object(batch)))
}
