use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::Result;

/// Idle lifetime of an in-process session unless configured otherwise.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

/// Per-client key-value state shared across requests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>>;

    async fn set(&self, session_id: &str, key: &str, value: Value) -> Result<()>;

    /// Inserts `field → entry` into the object stored under `key`, creating
    /// it when absent. Concurrent appends to one key never lose entries.
    async fn append(&self, session_id: &str, key: &str, field: &str, entry: Value) -> Result<()>;

    /// Read-then-delete as a single step.
    async fn take(&self, session_id: &str, key: &str) -> Result<Option<Value>>;
}

struct Session {
    values: HashMap<String, Value>,
    expires_at: Instant,
}

/// In-process sessions. One lock covers every session, which makes `take`
/// and `append` atomic.
///
/// A session expires `ttl` after its last write; expired sessions are
/// purged on every access.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn session_count(&self) -> usize {
        let mut sessions = self.sessions.lock();
        purge_expired(&mut sessions);
        sessions.len()
    }

    /// Runs `f` on the live session, creating it and pushing its expiry out.
    fn write<R>(&self, session_id: &str, f: impl FnOnce(&mut HashMap<String, Value>) -> R) -> R {
        let mut sessions = self.sessions.lock();
        purge_expired(&mut sessions);
        let expires_at = Instant::now() + self.ttl;
        let session = sessions
            .entry(session_id.to_owned())
            .or_insert_with(|| Session {
                values: HashMap::new(),
                expires_at,
            });
        session.expires_at = expires_at;
        f(&mut session.values)
    }
}

fn purge_expired(sessions: &mut HashMap<String, Session>) {
    let now = Instant::now();
    sessions.retain(|_, s| s.expires_at > now);
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let mut sessions = self.sessions.lock();
        purge_expired(&mut sessions);
        Ok(sessions
            .get(session_id)
            .and_then(|s| s.values.get(key))
            .cloned())
    }

    async fn set(&self, session_id: &str, key: &str, value: Value) -> Result<()> {
        self.write(session_id, |values| {
            values.insert(key.to_owned(), value);
        });
        Ok(())
    }

    async fn append(&self, session_id: &str, key: &str, field: &str, entry: Value) -> Result<()> {
        self.write(session_id, |values| {
            let slot = values
                .entry(key.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(batch) = slot {
                batch.insert(field.to_owned(), entry);
            }
        });
        Ok(())
    }

    async fn take(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let mut sessions = self.sessions.lock();
        purge_expired(&mut sessions);
        let Some(session) = sessions.get_mut(session_id) else {
            return Ok(None);
        };
        let value = session.values.remove(key);
        if session.values.is_empty() {
            sessions.remove(session_id);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = MemorySessionStore::new();
        store.set("a", "k", json!(1)).await.unwrap();
        store.set("b", "k", json!(2)).await.unwrap();
        assert_eq!(store.get("a", "k").await.unwrap(), Some(json!(1)));
        assert_eq!(store.take("b", "k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get("a", "k").await.unwrap(), Some(json!(1)));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_takes_see_the_value_once() {
        let store = Arc::new(MemorySessionStore::new());
        store.set("s", "k", json!("batch")).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.take("s", "k").await.unwrap() })
            })
            .collect();

        let mut hits = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                hits += 1;
            }
        }
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn append_builds_an_object() {
        let store = MemorySessionStore::new();
        store.append("s", "k", "a", json!(1)).await.unwrap();
        store.append("s", "k", "b", Value::Null).await.unwrap();
        assert_eq!(store.take("s", "k").await.unwrap(), Some(json!({ "a": 1, "b": null })));

        store.set("s", "k", json!("scalar")).await.unwrap();
        store.append("s", "k", "c", json!(3)).await.unwrap();
        assert_eq!(store.get("s", "k").await.unwrap(), Some(json!({ "c": 3 })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_appends_keep_every_entry() {
        let store = Arc::new(MemorySessionStore::new());

        let handles: Vec<_> = (0..200)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.append("s", "batch", &format!("req-{i}"), json!(i)).await.unwrap()
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        let batch = store.take("s", "batch").await.unwrap().unwrap();
        assert_eq!(batch.as_object().unwrap().len(), 200);
    }

    #[tokio::test]
    async fn expired_sessions_are_purged() {
        let store = MemorySessionStore::with_ttl(Duration::ZERO);
        store.set("s", "k", json!(1)).await.unwrap();
        assert_eq!(store.get("s", "k").await.unwrap(), None);
        assert_eq!(store.take("s", "k").await.unwrap(), None);
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn live_sessions_survive_purging() {
        let store = MemorySessionStore::with_ttl(Duration::from_secs(60));
        store.set("s", "k", json!(1)).await.unwrap();
        assert_eq!(store.get("s", "k").await.unwrap(), Some(json!(1)));
        assert_eq!(store.session_count(), 1);
    }
}
