use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{meta_of, select, Filters, Storage};
use crate::error::{DebugBarError, Result};
use crate::CollectionRecord;

/// Records kept by [`MemoryStorage::new`].
pub const DEFAULT_MEMORY_CAPACITY: usize = 1_000;

/// In-process storage. Entries are kept in save order; re-saving an id
/// moves it to the most recent position. Once `capacity` is reached each
/// save evicts the oldest entry.
pub struct MemoryStorage {
    entries: RwLock<VecDeque<(String, CollectionRecord)>>,
    capacity: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero capacity is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Storage pre-filled with `(id, record)` pairs, oldest first.
    pub fn with_entries(entries: impl IntoIterator<Item = (String, CollectionRecord)>) -> Self {
        let entries: VecDeque<_> = entries.into_iter().collect();
        Self {
            capacity: entries.len().max(DEFAULT_MEMORY_CAPACITY),
            entries: RwLock::new(entries),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, id: &str, data: &CollectionRecord) -> Result<()> {
        let mut entries = self.entries.write();
        entries.retain(|(existing, _)| existing != id);
        while entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.pop_front() {
                tracing::debug!(request_id = %evicted, "memory storage full; oldest record evicted");
            }
        }
        entries.push_back((id.to_owned(), data.clone()));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<CollectionRecord> {
        self.entries
            .read()
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| DebugBarError::RequestNotFound(id.to_owned()))
    }

    async fn find(&self, filters: &Filters, max: Option<usize>, offset: usize) -> Result<Vec<Value>> {
        let metas: Vec<Value> = self
            .entries
            .read()
            .iter()
            .rev()
            .map(|(_, data)| meta_of(data))
            .collect();
        Ok(select(metas, filters, max, offset))
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, uri: &str) -> CollectionRecord {
        json!({ "__meta": { "id": id, "uri": uri }, "mock": [1, 2] })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn save_get_round_trip() {
        let storage = MemoryStorage::new();
        let data = record("a", "/");
        storage.save("a", &data).await.unwrap();
        assert_eq!(storage.get("a").await.unwrap(), data);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let err = MemoryStorage::new().get("missing").await.unwrap_err();
        assert!(matches!(err, DebugBarError::RequestNotFound(ref id) if id == "missing"));
    }

    #[tokio::test]
    async fn save_overwrites() {
        let storage = MemoryStorage::new();
        storage.save("a", &record("a", "/first")).await.unwrap();
        storage.save("a", &record("a", "/second")).await.unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get("a").await.unwrap()["__meta"]["uri"], "/second");
    }

    #[tokio::test]
    async fn find_is_most_recent_first() {
        let storage = MemoryStorage::new();
        for id in ["a", "b", "c"] {
            storage.save(id, &record(id, &format!("/{id}"))).await.unwrap();
        }

        let found = storage.find(&Filters::new(), None, 0).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["c", "b", "a"]);

        let filters = Filters::from([("uri".to_owned(), "/b".to_owned())]);
        let found = storage.find(&filters, Some(5), 0).await.unwrap();
        assert_eq!(found, vec![json!({ "id": "b", "uri": "/b" })]);
    }

    #[tokio::test]
    async fn full_storage_evicts_oldest() {
        let storage = MemoryStorage::with_capacity(2);
        for id in ["a", "b", "c"] {
            storage.save(id, &record(id, "/")).await.unwrap();
        }
        assert_eq!(storage.len(), 2);
        assert!(storage.get("a").await.unwrap_err().is_not_found());
        assert!(storage.get("c").await.is_ok());

        // Re-saving refreshes recency, so "c" outlives "b"
        storage.save("b", &record("b", "/again")).await.unwrap();
        storage.save("c", &record("c", "/again")).await.unwrap();
        storage.save("d", &record("d", "/")).await.unwrap();
        assert!(storage.get("b").await.unwrap_err().is_not_found());
        assert_eq!(storage.get("c").await.unwrap()["__meta"]["uri"], "/again");
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let storage = MemoryStorage::with_entries([("a".to_owned(), record("a", "/"))]);
        storage.clear().await.unwrap();
        storage.clear().await.unwrap();
        assert!(storage.find(&Filters::new(), None, 0).await.unwrap().is_empty());
        assert!(storage.is_empty());
    }
}
