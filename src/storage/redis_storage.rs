use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use super::{select, Filters, Storage};
use crate::error::{DebugBarError, Result};
use crate::{CollectionRecord, META_KEY};

/// Two hashes keyed by request id: `<hash>:meta` holds the `__meta`
/// objects so `find` never loads full records, `<hash>:data` the rest.
pub struct RedisStorage {
    conn: ConnectionManager,
    hash: String,
}

impl RedisStorage {
    pub fn new(conn: ConnectionManager, hash: impl Into<String>) -> Self {
        Self {
            conn,
            hash: hash.into(),
        }
    }

    pub async fn connect(url: &str, hash: impl Into<String>) -> Result<Self> {
        Ok(Self::new(crate::redis_client::connect(url).await?, hash))
    }

    fn meta_key(&self) -> String {
        format!("{}:meta", self.hash)
    }

    fn data_key(&self) -> String {
        format!("{}:data", self.hash)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn save(&self, id: &str, data: &CollectionRecord) -> Result<()> {
        let mut body = data.clone();
        let meta = body.remove(META_KEY).unwrap_or(Value::Null);

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(self.meta_key(), id, serde_json::to_string(&meta)?)
            .ignore()
            .hset(self.data_key(), id, serde_json::to_string(&body)?)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<CollectionRecord> {
        let mut conn = self.conn.clone();
        let (body, meta): (Option<String>, Option<String>) = redis::pipe()
            .hget(self.data_key(), id)
            .hget(self.meta_key(), id)
            .query_async(&mut conn)
            .await?;

        let body = body.ok_or_else(|| DebugBarError::RequestNotFound(id.to_owned()))?;
        let mut data: CollectionRecord = serde_json::from_str(&body)?;
        if let Some(meta) = meta {
            data.insert(META_KEY.to_owned(), serde_json::from_str(&meta)?);
        }
        Ok(data)
    }

    async fn find(&self, filters: &Filters, max: Option<usize>, offset: usize) -> Result<Vec<Value>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(self.meta_key()).await?;

        let metas = raw
            .into_values()
            .filter_map(|json| serde_json::from_str::<Value>(&json).ok())
            .collect();
        Ok(select(metas, filters, max, offset))
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(vec![self.meta_key(), self.data_key()]).await?;
        Ok(())
    }
}
