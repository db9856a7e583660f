use axum::{middleware as axum_mw, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::config::{DebugBarConfig, SessionBackend, StorageBackend};
use crate::error::Result;
use crate::handlers;
use crate::http::{MemorySessionStore, RedisSessionStore, SessionStore};
use crate::middleware::debugbar::debugbar_middleware;
use crate::redis_client;
use crate::storage::{FileStorage, MemoryStorage, RedisStorage, Storage};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub config: DebugBarConfig,

    /// Record storage; `None` disables persistence and the open handler.
    pub storage: Option<Arc<dyn Storage>>,

    /// Session state used for stacking across redirects.
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    /// Builds the storage and session backends named in `config`.
    pub async fn from_config(config: DebugBarConfig) -> Result<Self> {
        let storage = build_storage(&config).await?;
        let sessions = build_sessions(&config).await?;
        Ok(Self {
            config,
            storage,
            sessions,
        })
    }
}

async fn build_storage(config: &DebugBarConfig) -> Result<Option<Arc<dyn Storage>>> {
    let storage: Arc<dyn Storage> = match config.storage.backend {
        StorageBackend::None => return Ok(None),
        StorageBackend::Memory => Arc::new(MemoryStorage::with_capacity(config.storage.memory_capacity)),
        StorageBackend::File => Arc::new(FileStorage::new(config.storage.path.clone())),
        StorageBackend::Redis => Arc::new(
            RedisStorage::connect(&config.storage.redis_url, config.storage.redis_hash.clone())
                .await?,
        ),
    };
    Ok(Some(storage))
}

async fn build_sessions(config: &DebugBarConfig) -> Result<Arc<dyn SessionStore>> {
    Ok(match config.session.backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::with_ttl(Duration::from_secs(
            config.session.ttl_secs,
        ))),
        SessionBackend::Redis => {
            let conn = redis_client::connect(&config.storage.redis_url).await?;
            Arc::new(RedisSessionStore::new(conn, config.session.ttl_secs))
        }
    })
}

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Demo endpoints ──────────────────────────────────────
        .route("/api/hello", get(handlers::demo::hello))
        .route("/api/redirect", get(handlers::demo::redirect))
        // ── Debugbar protocol ───────────────────────────────────
        .route("/_debugbar/open", get(handlers::open::open))
        .route("/_debugbar/stacked", get(handlers::open::stacked))
        // ── Per-request collection ──────────────────────────────
        .layer(axum_mw::from_fn_with_state(state.clone(), debugbar_middleware))
        .with_state(state)
        .layer(CorsLayer::permissive())
}
