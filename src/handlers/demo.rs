use axum::{
    extract::Query,
    response::{IntoResponse, Redirect},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::collectors::time::unix_now;
use crate::middleware::debugbar::RequestDebugBar;

#[derive(Debug, Deserialize)]
pub struct HelloQuery {
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_name() -> String {
    "world".into()
}

// ─── GET /api/hello ──────────────────────────────────────────────

pub async fn hello(
    Extension(ctx): Extension<RequestDebugBar>,
    Query(query): Query<HelloQuery>,
) -> Json<Value> {
    let start = unix_now();
    let body = json!({ "greeting": format!("hello, {}", query.name) });
    ctx.time.add_measure("build greeting", start, unix_now());

    Json(body)
}

// ─── GET /api/redirect ───────────────────────────────────────────

/// Redirects to `/api/hello`; the middleware stacks this request's data.
pub async fn redirect() -> impl IntoResponse {
    Redirect::to("/api/hello")
}
