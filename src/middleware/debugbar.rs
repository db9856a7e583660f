use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::collectors::{LocalizationCollector, MemoryCollector, SqlCollector, TimeCollector};
use crate::debugbar::DebugBar;
use crate::error::Result;
use crate::http::SessionHttpDriver;
use crate::server::AppState;

/// Cookie carrying the session id used for stacking.
pub const SESSION_COOKIE: &str = "debugbar_sid";

/// Per-request handle placed in the request extensions, so handlers can
/// record statements and measures.
#[derive(Clone)]
pub struct RequestDebugBar {
    pub bar: Arc<DebugBar>,
    pub sql: Arc<SqlCollector>,
    pub time: Arc<TimeCollector>,
}

impl RequestDebugBar {
    /// Standard collector set: time, memory, localization, sql.
    pub fn build(state: &AppState, driver: Arc<SessionHttpDriver>) -> Result<Self> {
        let mut bar = DebugBar::new(state.config.clone()).with_http_driver(driver);
        if let Some(storage) = &state.storage {
            bar = bar.with_storage(storage.clone());
        }

        let time = Arc::new(TimeCollector::new());
        let sql = Arc::new(SqlCollector::from_config(&state.config.sql));
        bar.add_collector(time.clone())?;
        bar.add_collector(Arc::new(MemoryCollector::new()))?;
        bar.add_collector(Arc::new(LocalizationCollector::default()))?;
        bar.add_collector(sql.clone())?;

        Ok(Self {
            bar: Arc::new(bar),
            sql,
            time,
        })
    }
}

/// Reads the session id from the `Cookie` header, ignoring malformed ids.
pub fn session_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_owned())
        .filter(|sid| !sid.is_empty() && sid.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Runs one collection cycle around every non-debugbar request:
///
///   3xx responses: data is stacked in the session for the next request
///   otherwise: data (or its id, when storage is on) goes in headers
///
/// Also adds `X-Response-Time-Us` / `Server-Timing` and logs one line.
pub async fn debugbar_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if path.starts_with("/_debugbar/") {
        return next.run(req).await;
    }
    let method = req.method().clone();
    let start = Instant::now();

    let existing_sid = session_id_from(req.headers());
    let sid = existing_sid
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let driver = Arc::new(SessionHttpDriver::new(state.sessions.clone(), Some(sid.clone())));

    let ctx = match RequestDebugBar::build(&state, driver.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "cannot set up debugbar; passing request through");
            return next.run(req).await;
        }
    };
    ctx.bar.set_meta("method", method.as_str());
    ctx.bar.set_meta("uri", req.uri().to_string());
    if let Some(ip) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        ctx.bar.set_meta("ip", ip);
    }
    ctx.time
        .start_measure("handler", Some(&format!("{method} {path}")));
    req.extensions_mut().insert(ctx.clone());

    let mut response = next.run(req).await;
    ctx.time.stop_measure("handler");

    // ── Deliver collected data ──────────────────────────────────
    let delivered = if response.status().is_redirection() {
        ctx.bar.stack_data().await
    } else {
        ctx.bar.send_data_in_headers(state.storage.is_some()).await
    };
    if let Err(e) = delivered {
        tracing::warn!(error = %e, path = %path, "debugbar delivery failed");
    }

    for (name, value) in driver.take_headers() {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => tracing::warn!("dropping debugbar header that is not valid HTTP"),
        }
    }
    if existing_sid.is_none() {
        let cookie = format!("{SESSION_COOKIE}={sid}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(val) = HeaderValue::try_from(cookie) {
            response.headers_mut().append(header::SET_COOKIE, val);
        }
    }

    // ── Timing headers ──────────────────────────────────────────
    let elapsed = start.elapsed();
    let us = elapsed.as_micros();
    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }
    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    let status = response.status().as_u16();
    if path.starts_with("/api/") {
        tracing::info!(
            status,
            method = %method,
            path = %path,
            request_id = ctx.bar.current_request_id(),
            "{us}μs"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id_from(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("a=1; debugbar_sid=abc123; b=2"));
        assert_eq!(session_id_from(&headers).as_deref(), Some("abc123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("debugbar_sid=../x"));
        assert_eq!(session_id_from(&headers), None);
    }
}
