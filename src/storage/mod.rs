//! Persistence of complete collection records, keyed by request id.
//!
//! Backends provide their own atomicity for single operations; nothing here
//! adds locking on top. Every saved record carries a `__meta` object and
//! `find` works on those objects only.

mod file;
mod memory;
mod redis_storage;

pub use self::file::FileStorage;
pub use self::memory::{MemoryStorage, DEFAULT_MEMORY_CAPACITY};
pub use self::redis_storage::RedisStorage;

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::error::Result;
use crate::{CollectionRecord, META_KEY};

/// Field → glob pattern (`*`, `?`) matched against `__meta`.
pub type Filters = HashMap<String, String>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Upserts one record.
    async fn save(&self, id: &str, data: &CollectionRecord) -> Result<()>;

    /// # Errors
    /// `RequestNotFound` when nothing is stored under `id`.
    async fn get(&self, id: &str) -> Result<CollectionRecord>;

    /// Metadata of matching records, most recent first.
    async fn find(&self, filters: &Filters, max: Option<usize>, offset: usize) -> Result<Vec<Value>>;

    /// Deletes everything. Idempotent.
    async fn clear(&self) -> Result<()>;
}

/// The `__meta` object of a record, `Null` when absent.
pub fn meta_of(data: &CollectionRecord) -> Value {
    data.get(META_KEY).cloned().unwrap_or(Value::Null)
}

/// Compiled filter set; a missing meta field never matches.
pub struct MetaFilter {
    rules: Vec<(String, Regex)>,
}

impl MetaFilter {
    pub fn new(filters: &Filters) -> Self {
        let rules = filters
            .iter()
            .filter_map(|(field, pattern)| glob_to_regex(pattern).map(|re| (field.clone(), re)))
            .collect();
        Self { rules }
    }

    pub fn matches(&self, meta: &Value) -> bool {
        self.rules.iter().all(|(field, re)| match meta.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => re.is_match(s),
            Some(other) => re.is_match(&other.to_string()),
        })
    }
}

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Descending `utime`; entries without one sort last.
pub(crate) fn by_recency(a: &Value, b: &Value) -> Ordering {
    let ta = a.get("utime").and_then(Value::as_f64);
    let tb = b.get("utime").and_then(Value::as_f64);
    match (ta, tb) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Filters, orders and pages a set of metadata objects.
pub(crate) fn select(
    mut metas: Vec<Value>,
    filters: &Filters,
    max: Option<usize>,
    offset: usize,
) -> Vec<Value> {
    let filter = MetaFilter::new(filters);
    metas.retain(|m| filter.matches(m));
    metas.sort_by(by_recency);
    metas
        .into_iter()
        .skip(offset)
        .take(max.unwrap_or(usize::MAX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(pairs: &[(&str, &str)]) -> Filters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn glob_filters() {
        let meta = json!({ "id": "a1", "uri": "/api/users/7", "method": "GET", "utime": 12.5 });

        assert!(MetaFilter::new(&filters(&[])).matches(&meta));
        assert!(MetaFilter::new(&filters(&[("method", "GET")])).matches(&meta));
        assert!(MetaFilter::new(&filters(&[("uri", "/api/users/*")])).matches(&meta));
        assert!(MetaFilter::new(&filters(&[("id", "a?")])).matches(&meta));
        assert!(MetaFilter::new(&filters(&[("utime", "12.5")])).matches(&meta));
        assert!(!MetaFilter::new(&filters(&[("method", "POST")])).matches(&meta));
        assert!(!MetaFilter::new(&filters(&[("ip", "*")])).matches(&meta));
        assert!(!MetaFilter::new(&filters(&[("uri", "/api")])).matches(&meta));
    }

    #[test]
    fn regex_meta_characters_are_literal() {
        let meta = json!({ "uri": "/a.b(c)" });
        assert!(MetaFilter::new(&filters(&[("uri", "/a.b(c)")])).matches(&meta));
        assert!(!MetaFilter::new(&filters(&[("uri", "/axb(c)")])).matches(&meta));
    }

    #[test]
    fn select_orders_and_pages() {
        let metas = vec![
            json!({ "id": "old", "utime": 1.0 }),
            json!({ "id": "new", "utime": 3.0 }),
            json!({ "id": "mid", "utime": 2.0 }),
        ];
        let ids = |v: Vec<Value>| v.iter().map(|m| m["id"].as_str().unwrap().to_owned()).collect::<Vec<_>>();

        assert_eq!(ids(select(metas.clone(), &Filters::new(), None, 0)), ["new", "mid", "old"]);
        assert_eq!(ids(select(metas.clone(), &Filters::new(), Some(1), 1)), ["mid"]);
        assert!(select(metas, &Filters::new(), Some(0), 0).is_empty());
    }
}
