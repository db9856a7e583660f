//! Transport collaborator: response headers and session state.
//!
//! The aggregator never touches HTTP types directly. It hands header sets
//! to an [`HttpDriver`] and keeps stacked batches in the driver's session.

mod redis_session;
mod session;

pub use redis_session::RedisSessionStore;
pub use session::{MemorySessionStore, SessionStore};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{DebugBarError, Result};

#[async_trait]
pub trait HttpDriver: Send + Sync {
    /// Queues headers for the outgoing response.
    fn set_headers(&self, headers: Vec<(String, String)>);

    fn is_session_started(&self) -> bool;

    async fn get_session_value(&self, name: &str) -> Result<Option<Value>>;

    async fn set_session_value(&self, name: &str, value: Value) -> Result<()>;

    /// Adds `field → entry` to the object stored under `name` in one step.
    async fn append_session_value(&self, name: &str, field: &str, entry: Value) -> Result<()>;

    async fn has_session_value(&self, name: &str) -> Result<bool> {
        Ok(self.get_session_value(name).await?.is_some())
    }

    /// Reads and removes `name` as one step; a concurrent reader sees
    /// either the full value or nothing.
    async fn take_session_value(&self, name: &str) -> Result<Option<Value>>;
}

/// Driver backed by a [`SessionStore`] and one session id.
///
/// Headers are buffered until the response is built; the server
/// middleware drains them with [`take_headers`](Self::take_headers).
pub struct SessionHttpDriver {
    store: Arc<dyn SessionStore>,
    session_id: Option<String>,
    headers: Mutex<Vec<(String, String)>>,
}

impl SessionHttpDriver {
    pub fn new(store: Arc<dyn SessionStore>, session_id: Option<String>) -> Self {
        Self {
            store,
            session_id,
            headers: Mutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.headers.lock().clone()
    }

    pub fn take_headers(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.headers.lock())
    }

    fn sid(&self) -> Result<&str> {
        self.session_id
            .as_deref()
            .ok_or_else(|| DebugBarError::Session("no session started".into()))
    }
}

#[async_trait]
impl HttpDriver for SessionHttpDriver {
    fn set_headers(&self, headers: Vec<(String, String)>) {
        let mut buffered = self.headers.lock();
        for (name, value) in headers {
            // Later values replace earlier ones with the same name
            buffered.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
            buffered.push((name, value));
        }
    }

    fn is_session_started(&self) -> bool {
        self.session_id.is_some()
    }

    async fn get_session_value(&self, name: &str) -> Result<Option<Value>> {
        self.store.get(self.sid()?, name).await
    }

    async fn set_session_value(&self, name: &str, value: Value) -> Result<()> {
        self.store.set(self.sid()?, name, value).await
    }

    async fn append_session_value(&self, name: &str, field: &str, entry: Value) -> Result<()> {
        self.store.append(self.sid()?, name, field, entry).await
    }

    async fn take_session_value(&self, name: &str) -> Result<Option<Value>> {
        self.store.take(self.sid()?, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn driver(sid: Option<&str>) -> SessionHttpDriver {
        SessionHttpDriver::new(Arc::new(MemorySessionStore::new()), sid.map(str::to_owned))
    }

    #[test]
    fn headers_replace_by_name() {
        let driver = driver(None);
        driver.set_headers(vec![("debugbar".into(), "a".into())]);
        driver.set_headers(vec![("DebugBar".into(), "b".into()), ("debugbar-id".into(), "x".into())]);
        assert_eq!(
            driver.take_headers(),
            vec![("DebugBar".to_owned(), "b".to_owned()), ("debugbar-id".to_owned(), "x".to_owned())]
        );
        assert!(driver.headers().is_empty());
    }

    #[tokio::test]
    async fn session_values_round_trip() {
        let driver = driver(Some("s1"));
        assert!(driver.is_session_started());
        assert!(!driver.has_session_value("k").await.unwrap());

        driver.set_session_value("k", json!({ "a": 1 })).await.unwrap();
        assert!(driver.has_session_value("k").await.unwrap());
        assert_eq!(driver.take_session_value("k").await.unwrap(), Some(json!({ "a": 1 })));
        assert_eq!(driver.take_session_value("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_ops_need_a_session() {
        let driver = driver(None);
        assert!(!driver.is_session_started());
        let err = driver.get_session_value("k").await.unwrap_err();
        assert!(matches!(err, DebugBarError::Session(_)));
        let err = driver.append_session_value("k", "f", json!(1)).await.unwrap_err();
        assert!(matches!(err, DebugBarError::Session(_)));
    }
}
