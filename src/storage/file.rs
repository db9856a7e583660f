use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use super::{meta_of, select, Filters, Storage};
use crate::error::{DebugBarError, Result};
use crate::CollectionRecord;

/// One `<id>.json` file per record inside a directory.
///
/// The directory is created on first save. Ids are restricted to
/// `[A-Za-z0-9_-]` so they can never escape it.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(DebugBarError::invalid_request(format!("invalid request id '{id}'")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn json_files(&self) -> Result<Vec<PathBuf>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, id: &str, data: &CollectionRecord) -> Result<()> {
        let path = self.path_for(id)?;
        fs::create_dir_all(&self.dir).await?;
        fs::write(&path, serde_json::to_vec(data)?).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<CollectionRecord> {
        let path = self.path_for(id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DebugBarError::RequestNotFound(id.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn find(&self, filters: &Filters, max: Option<usize>, offset: usize) -> Result<Vec<Value>> {
        let mut metas = Vec::new();
        for path in self.json_files().await? {
            // Files removed or half-written by a concurrent writer are skipped
            let Ok(bytes) = fs::read(&path).await else {
                continue;
            };
            match serde_json::from_slice::<CollectionRecord>(&bytes) {
                Ok(data) => metas.push(meta_of(&data)),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        Ok(select(metas, filters, max, offset))
    }

    async fn clear(&self) -> Result<()> {
        for path in self.json_files().await? {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, utime: f64) -> CollectionRecord {
        json!({ "__meta": { "id": id, "utime": utime, "method": "GET" }, "mock": "x" })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));

        let data = record("abc", 1.0);
        storage.save("abc", &data).await.unwrap();
        assert!(dir.path().join("nested/abc.json").exists());
        assert_eq!(storage.get("abc").await.unwrap(), data);
    }

    #[tokio::test]
    async fn missing_and_invalid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        assert!(storage.get("nope").await.unwrap_err().is_not_found());
        let err = storage.get("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, DebugBarError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn find_orders_by_utime_and_clear_empties() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.save("first", &record("first", 10.0)).await.unwrap();
        storage.save("second", &record("second", 20.0)).await.unwrap();

        let found = storage.find(&Filters::new(), None, 0).await.unwrap();
        assert_eq!(found[0]["id"], "second");
        assert_eq!(found[1]["id"], "first");

        let limited = storage.find(&Filters::new(), Some(1), 0).await.unwrap();
        assert_eq!(limited.len(), 1);

        storage.clear().await.unwrap();
        storage.clear().await.unwrap();
        assert!(storage.find(&Filters::new(), None, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("never-created"));
        assert!(storage.find(&Filters::new(), None, 0).await.unwrap().is_empty());
        storage.clear().await.unwrap();
    }
}
