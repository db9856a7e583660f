//! Collectors and their optional capabilities.
//!
//! A collector is a named producer of one JSON value per collection pass.
//! Capabilities beyond that (widgets for a UI) are separate traits, reached
//! through capability queries on [`Collector`] rather than downcasting.

pub mod format;
pub mod localization;
pub mod memory;
pub mod sql;
pub mod summary;
pub mod time;

use serde_json::{Map, Value};
use thiserror::Error;

pub use localization::LocalizationCollector;
pub use memory::MemoryCollector;
pub use sql::SqlCollector;
pub use summary::DurationSummary;
pub use time::TimeCollector;

/// Failure raised by a single collector during `collect()`.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("{0}")]
    Failed(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait Collector: Send + Sync {
    /// Unique key of this collector inside a registry.
    fn name(&self) -> &str;

    /// Measure now and return a JSON-safe snapshot.
    fn collect(&self) -> Result<Value, CollectorError>;

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        None
    }
}

/// Collectors that describe how a UI should display them.
pub trait Renderable {
    /// Widget name → widget description (`icon`, `map`, `default`, ...).
    fn widgets(&self) -> Map<String, Value>;
}
