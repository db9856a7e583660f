//! Crate-wide error type.
//!
//! Registry and storage errors are returned to the immediate caller. Nothing
//! in here knows about HTTP status codes; the server maps them in
//! `handlers::AppError`.

use thiserror::Error;

use crate::collectors::CollectorError;

pub type Result<T> = std::result::Result<T, DebugBarError>;

#[derive(Debug, Error)]
pub enum DebugBarError {
    /// A collector with this name is already registered.
    #[error("'{0}' is already a registered collector")]
    DuplicateName(String),

    /// No collector with this name is registered.
    #[error("'{0}' is not a registered collector")]
    CollectorNotFound(String),

    /// Storage holds no entry for this request id.
    #[error("request '{0}' not found in storage")]
    RequestNotFound(String),

    /// Malformed open-handler request (missing id, unknown op, bad number).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A collector failed while the aggregator runs in strict mode.
    #[error("collector '{name}' failed: {source}")]
    CollectorFailure {
        name: String,
        #[source]
        source: CollectorError,
    },

    /// `end()` called on a statement that never started.
    #[error("statement was ended before it was started")]
    StatementNotStarted,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Session store misbehaved (wrong value shape, no session started).
    #[error("session error: {0}")]
    Session(String),

    #[error("config error: {0}")]
    Config(String),
}

impl DebugBarError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// True for both unknown collector names and unknown stored ids.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CollectorNotFound(_) | Self::RequestNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_covers_both_lookups() {
        assert!(DebugBarError::CollectorNotFound("x".into()).is_not_found());
        assert!(DebugBarError::RequestNotFound("x".into()).is_not_found());
        assert!(!DebugBarError::invalid_request("id is required").is_not_found());
    }

    #[test]
    fn collector_failure_names_the_collector() {
        let err = DebugBarError::CollectorFailure {
            name: "sql".into(),
            source: CollectorError::Failed("boom".into()),
        };
        assert_eq!(err.to_string(), "collector 'sql' failed: boom");
    }
}
