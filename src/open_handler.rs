//! Query protocol over stored records: `find`, `get` and `clear`.
//!
//! Requests are flat string maps (a parsed query string). Responses are
//! JSON text. Errors are returned as-is; choosing a status code is the
//! transport's business.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{DebugBarError, Result};
use crate::storage::{Filters, Storage};

pub type OpenRequest = HashMap<String, String>;

/// Keys with protocol meaning; everything else is a `find` filter.
const RESERVED_KEYS: &[&str] = &["op", "id", "max", "offset"];

pub struct OpenHandler {
    storage: Arc<dyn Storage>,
}

impl OpenHandler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Dispatches on `op` and serializes the answer.
    pub async fn handle(&self, request: &OpenRequest) -> Result<String> {
        let value = self.handle_value(request).await?;
        Ok(serde_json::to_string(&value)?)
    }

    pub async fn handle_value(&self, request: &OpenRequest) -> Result<Value> {
        match request.get("op").map(String::as_str) {
            None | Some("find") => self.find(request).await,
            Some("get") => self.get(request).await,
            Some("clear") => self.clear().await,
            Some(other) => Err(DebugBarError::invalid_request(format!(
                "unknown operation '{other}'"
            ))),
        }
    }

    async fn find(&self, request: &OpenRequest) -> Result<Value> {
        let max = parse_count(request, "max")?;
        let offset = parse_count(request, "offset")?.unwrap_or(0);
        let filters: Filters = request
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let found = self.storage.find(&filters, max, offset).await?;
        Ok(Value::Array(found))
    }

    async fn get(&self, request: &OpenRequest) -> Result<Value> {
        let id = request
            .get("id")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DebugBarError::invalid_request("id is required"))?;
        Ok(Value::Object(self.storage.get(id).await?))
    }

    async fn clear(&self) -> Result<Value> {
        self.storage.clear().await?;
        tracing::debug!("storage cleared through open handler");
        Ok(json!({ "success": true }))
    }
}

fn parse_count(request: &OpenRequest, key: &str) -> Result<Option<usize>> {
    request
        .get(key)
        .map(|raw| {
            raw.parse::<usize>().map_err(|_| {
                DebugBarError::invalid_request(format!("'{key}' must be a non-negative integer"))
            })
        })
        .transpose()
}
