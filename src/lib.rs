//! Per-request diagnostic data collection.
//!
//! A [`DebugBar`] runs a set of [`Collector`]s once per request and turns
//! their output into one JSON record keyed by collector name. The record can
//! be delivered in response headers, written to a [`Storage`] backend, or
//! stacked in the client's session so it survives a redirect. The
//! [`OpenHandler`] answers `find`/`get`/`clear` queries against storage.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use request_debugbar::{DebugBar, DebugBarConfig, MemoryStorage, SqlCollector};
//!
//! # async fn run() -> request_debugbar::Result<()> {
//! let sql = Arc::new(SqlCollector::new());
//! let bar = DebugBar::new(DebugBarConfig::default())
//!     .with_storage(Arc::new(MemoryStorage::new()));
//! bar.add_collector(sql.clone())?;
//!
//! let mut stmt = sql.begin("SELECT * FROM users WHERE id = ?", [(0usize, 7i64)]);
//! stmt.end(None, 1, None, None)?;
//! sql.add_statement(stmt);
//!
//! let record = bar.collect().await?;
//! assert!(record.contains_key("sql"));
//! # Ok(())
//! # }
//! ```

pub mod collectors;
pub mod config;
pub mod debugbar;
pub mod error;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod open_handler;
pub mod redis_client;
pub mod request_id;
pub mod server;
pub mod sql;
pub mod storage;

pub use collectors::{
    Collector, CollectorError, LocalizationCollector, MemoryCollector, Renderable, SqlCollector,
    TimeCollector,
};
pub use config::DebugBarConfig;
pub use debugbar::{DebugBar, StackedBatch};
pub use error::{DebugBarError, Result};
pub use http::{HttpDriver, MemorySessionStore, RedisSessionStore, SessionHttpDriver, SessionStore};
pub use open_handler::{OpenHandler, OpenRequest};
pub use request_id::{RandomRequestIdGenerator, RequestIdGenerator};
pub use sql::{ErrorInfo, ParamKey, ParamValue, TracedStatement};
pub use storage::{FileStorage, Filters, MemoryStorage, RedisStorage, Storage};

/// Collector name → collected value.
pub type CollectionRecord = serde_json::Map<String, serde_json::Value>;

/// Reserved key of the metadata sub-record on stored entries.
pub const META_KEY: &str = "__meta";
