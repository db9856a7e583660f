use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde_json::{Map, Value};

use super::SessionStore;
use crate::error::Result;

/// Sessions kept in redis, each key written with a TTL so abandoned
/// sessions expire.
///
/// Plain values live at `<prefix>:<session_id>:<key>` as JSON strings.
/// Appended entries live in a hash at `<prefix>:<session_id>:<key>:fields`,
/// so concurrent appends are single `HSET`s and never overwrite each other.
pub struct RedisSessionStore {
    conn: ConnectionManager,
    prefix: String,
    ttl_secs: u64,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, ttl_secs: u64) -> Self {
        Self {
            conn,
            prefix: "debugbar:session".into(),
            ttl_secs,
        }
    }

    fn key(&self, session_id: &str, key: &str) -> String {
        format!("{}:{session_id}:{key}", self.prefix)
    }

    fn fields_key(&self, session_id: &str, key: &str) -> String {
        format!("{}:{session_id}:{key}:fields", self.prefix)
    }
}

/// Folds the hash fields over the plain value; fields win.
fn combine(plain: Option<String>, fields: HashMap<String, String>) -> Result<Option<Value>> {
    let plain: Option<Value> = plain.map(|s| serde_json::from_str(&s)).transpose()?;
    if fields.is_empty() {
        return Ok(plain);
    }

    let mut batch = match plain {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let mut fields: Vec<(String, String)> = fields.into_iter().collect();
    fields.sort();
    for (field, json) in fields {
        batch.insert(field, serde_json::from_str(&json)?);
    }
    Ok(Some(Value::Object(batch)))
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let (plain, fields): (Option<String>, HashMap<String, String>) = redis::pipe()
            .get(self.key(session_id, key))
            .hgetall(self.fields_key(session_id, key))
            .query_async(&mut conn)
            .await?;
        combine(plain, fields)
    }

    async fn set(&self, session_id: &str, key: &str, value: Value) -> Result<()> {
        let json = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.key(session_id, key))
            .arg(json)
            .arg("EX")
            .arg(self.ttl_secs)
            .ignore()
            .del(self.fields_key(session_id, key))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn append(&self, session_id: &str, key: &str, field: &str, entry: Value) -> Result<()> {
        let json = serde_json::to_string(&entry)?;
        let fields_key = self.fields_key(session_id, key);
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(&fields_key, field, json)
            .ignore()
            .cmd("EXPIRE")
            .arg(&fields_key)
            .arg(self.ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn take(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        // MULTI keeps the read and the delete of both keys in one step
        let fields_key = self.fields_key(session_id, key);
        let mut conn = self.conn.clone();
        let (plain, fields): (Option<String>, HashMap<String, String>) = redis::pipe()
            .atomic()
            .cmd("GETDEL")
            .arg(self.key(session_id, key))
            .hgetall(&fields_key)
            .del(&fields_key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        combine(plain, fields)
    }
}
