//! The aggregator: owns the collectors of one request and decides where the
//! collected record goes (storage, response headers, or the session stack).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};

use crate::collectors::Collector;
use crate::config::DebugBarConfig;
use crate::error::{DebugBarError, Result};
use crate::http::HttpDriver;
use crate::request_id::{RandomRequestIdGenerator, RequestIdGenerator};
use crate::storage::Storage;
use crate::{CollectionRecord, META_KEY};

/// Request id → record, as drained from the session.
pub type StackedBatch = Map<String, Value>;

/// One collection cycle.
///
/// Build one per request. Collectors run sequentially in registration
/// order; the request id is created on first use and never changes.
pub struct DebugBar {
    config: DebugBarConfig,
    collectors: RwLock<Vec<Arc<dyn Collector>>>,
    id_generator: Box<dyn RequestIdGenerator>,
    request_id: OnceLock<String>,
    storage: Option<Arc<dyn Storage>>,
    http_driver: Option<Arc<dyn HttpDriver>>,
    data: Mutex<Option<CollectionRecord>>,
    meta_extras: Mutex<Map<String, Value>>,
    persisted: AtomicBool,
}

impl std::fmt::Debug for DebugBar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugBar")
            .field("request_id", &self.request_id.get())
            .field("collectors", &self.collectors())
            .field("has_storage", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for DebugBar {
    fn default() -> Self {
        Self::new(DebugBarConfig::default())
    }
}

impl DebugBar {
    pub fn new(config: DebugBarConfig) -> Self {
        Self {
            config,
            collectors: RwLock::new(Vec::new()),
            id_generator: Box::new(RandomRequestIdGenerator),
            request_id: OnceLock::new(),
            storage: None,
            http_driver: None,
            data: Mutex::new(None),
            meta_extras: Mutex::new(Map::new()),
            persisted: AtomicBool::new(false),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_http_driver(mut self, driver: Arc<dyn HttpDriver>) -> Self {
        self.http_driver = Some(driver);
        self
    }

    pub fn with_request_id_generator(mut self, generator: impl RequestIdGenerator + 'static) -> Self {
        self.id_generator = Box::new(generator);
        self
    }

    pub fn config(&self) -> &DebugBarConfig {
        &self.config
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    // ─── Registry ────────────────────────────────────────────────

    /// # Errors
    /// `DuplicateName` when the name is taken; the existing collector stays.
    pub fn add_collector(&self, collector: Arc<dyn Collector>) -> Result<()> {
        let mut collectors = self.collectors.write();
        let name = collector.name();
        if collectors.iter().any(|c| c.name() == name) {
            return Err(DebugBarError::DuplicateName(name.to_owned()));
        }
        collectors.push(collector);
        Ok(())
    }

    pub fn remove_collector(&self, name: &str) -> Option<Arc<dyn Collector>> {
        let mut collectors = self.collectors.write();
        let pos = collectors.iter().position(|c| c.name() == name)?;
        Some(collectors.remove(pos))
    }

    pub fn has_collector(&self, name: &str) -> bool {
        self.collectors.read().iter().any(|c| c.name() == name)
    }

    pub fn get_collector(&self, name: &str) -> Result<Arc<dyn Collector>> {
        self.collectors
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| DebugBarError::CollectorNotFound(name.to_owned()))
    }

    /// Registered names, in registration order.
    pub fn collectors(&self) -> Vec<String> {
        self.collectors.read().iter().map(|c| c.name().to_owned()).collect()
    }

    /// Widgets of every renderable collector, keyed by collector name.
    pub fn widgets(&self) -> Map<String, Value> {
        self.collectors
            .read()
            .iter()
            .filter_map(|c| {
                c.as_renderable()
                    .map(|r| (c.name().to_owned(), Value::Object(r.widgets())))
            })
            .collect()
    }

    // ─── Request id & metadata ───────────────────────────────────

    pub fn current_request_id(&self) -> &str {
        self.request_id.get_or_init(|| self.id_generator.generate())
    }

    /// Adds a field to `__meta` (`method`, `uri`, `ip`, ...).
    pub fn set_meta(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.meta_extras.lock().insert(key.into(), value.into());
    }

    fn build_meta(&self) -> Value {
        let now = chrono::Utc::now();
        let mut meta = Map::new();
        meta.insert("id".into(), json!(self.current_request_id()));
        meta.insert("datetime".into(), json!(now.to_rfc3339()));
        meta.insert("utime".into(), json!(now.timestamp_micros() as f64 / 1_000_000.0));
        for (k, v) in self.meta_extras.lock().iter() {
            meta.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Value::Object(meta)
    }

    // ─── Collection ──────────────────────────────────────────────

    /// Runs every collector and, when storage is configured, persists.
    ///
    /// A failing collector leaves `{"error": "..."}` under its name unless
    /// the config is strict, in which case the pass stops with
    /// `CollectorFailure`.
    pub async fn collect(&self) -> Result<CollectionRecord> {
        let record = self.run_collectors()?;
        *self.data.lock() = Some(record.clone());

        if self.storage.is_some() {
            self.persist(&record).await?;
        }
        Ok(record)
    }

    fn run_collectors(&self) -> Result<CollectionRecord> {
        // Snapshot so no lock is held while collectors run
        let collectors: Vec<Arc<dyn Collector>> = self.collectors.read().clone();
        let mut record = CollectionRecord::new();

        for collector in collectors {
            let name = collector.name().to_owned();
            match collector.collect() {
                Ok(value) => {
                    record.insert(name, value);
                }
                Err(source) if self.config.strict => {
                    return Err(DebugBarError::CollectorFailure { name, source });
                }
                Err(e) => {
                    tracing::warn!(collector = %name, error = %e, "collector failed");
                    record.insert(name, json!({ "error": e.to_string() }));
                }
            }
        }

        tracing::debug!(
            request_id = self.current_request_id(),
            collectors = record.len(),
            "collection pass finished"
        );
        Ok(record)
    }

    /// The last collected record, collecting first if needed.
    pub async fn get_data(&self) -> Result<CollectionRecord> {
        let cached = self.data.lock().clone();
        match cached {
            Some(record) => Ok(record),
            None => self.collect().await,
        }
    }

    /// Writes `record` plus `__meta` under the current id. No-op without storage.
    pub async fn persist(&self, record: &CollectionRecord) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        let mut entry = record.clone();
        entry.insert(META_KEY.to_owned(), self.build_meta());
        let id = self.current_request_id();
        storage.save(id, &entry).await?;
        self.persisted.store(true, Ordering::SeqCst);

        tracing::debug!(request_id = id, "record persisted");
        Ok(())
    }

    pub fn is_data_persisted(&self) -> bool {
        self.persisted.load(Ordering::SeqCst)
    }

    // ─── Header delivery ─────────────────────────────────────────

    /// `<prefix>` → base64 of the JSON record. Size is not bounded here.
    pub fn data_as_headers(&self, record: &CollectionRecord) -> Result<Vec<(String, String)>> {
        let json = serde_json::to_vec(record)?;
        Ok(vec![(self.config.header_name.clone(), STANDARD.encode(json))])
    }

    /// Hands the record to the HTTP driver.
    ///
    /// With `use_open_handler` and storage configured only `<prefix>-id`
    /// is sent and the client fetches the record through the open handler.
    pub async fn send_data_in_headers(&self, use_open_handler: bool) -> Result<()> {
        let driver = self.require_driver()?;

        let headers = if use_open_handler && self.storage.is_some() {
            let record = self.get_data().await?;
            if !self.is_data_persisted() {
                self.persist(&record).await?;
            }
            vec![(
                format!("{}-id", self.config.header_name),
                self.current_request_id().to_owned(),
            )]
        } else {
            let record = self.get_data().await?;
            self.data_as_headers(&record)?
        };

        driver.set_headers(headers);
        Ok(())
    }

    // ─── Stacking ────────────────────────────────────────────────

    fn stacks_into_storage(&self) -> bool {
        self.storage.is_some() && !self.config.stack_always_use_session
    }

    /// Appends `record` under the current id to the session batch.
    ///
    /// With storage configured (and `stack_always_use_session` off) the
    /// record goes to storage and the session only keeps a null marker.
    pub async fn stack(&self, record: CollectionRecord) -> Result<()> {
        let entry = if self.stacks_into_storage() {
            self.persist(&record).await?;
            Value::Null
        } else {
            Value::Object(record)
        };
        self.push_stack_entry(entry).await
    }

    /// Stacks the current record, collecting it first if needed.
    pub async fn stack_data(&self) -> Result<()> {
        let record = self.get_data().await?;
        if self.stacks_into_storage() && self.is_data_persisted() {
            return self.push_stack_entry(Value::Null).await;
        }
        self.stack(record).await
    }

    async fn push_stack_entry(&self, entry: Value) -> Result<()> {
        let driver = self.require_session()?;
        let ns = &self.config.stack_session_namespace;
        let id = self.current_request_id();
        driver.append_session_value(ns, id, entry).await?;

        tracing::debug!(request_id = id, namespace = %ns, "record stacked");
        Ok(())
    }

    pub async fn has_stacked_data(&self) -> Result<bool> {
        match &self.http_driver {
            Some(driver) if driver.is_session_started() => {
                driver
                    .has_session_value(&self.config.stack_session_namespace)
                    .await
            }
            _ => Ok(false),
        }
    }

    /// Drains the session batch. One-shot: a second call returns an empty
    /// batch. Null markers are resolved through storage; a marker whose
    /// record is gone becomes `{"error": "..."}` so the rest still arrives.
    pub async fn get_stacked_data(&self) -> Result<StackedBatch> {
        let driver = self.require_session()?;
        let taken = driver
            .take_session_value(&self.config.stack_session_namespace)
            .await?;

        let raw = match taken {
            None => return Ok(StackedBatch::new()),
            Some(Value::Object(raw)) => raw,
            Some(other) => {
                return Err(DebugBarError::Session(format!(
                    "stacked data is not an object: {other}"
                )))
            }
        };

        let mut batch = StackedBatch::new();
        for (id, entry) in raw {
            let record = match (entry, &self.storage) {
                (Value::Null, Some(storage)) => match storage.get(&id).await {
                    Ok(record) => Value::Object(record),
                    Err(e) => {
                        tracing::warn!(request_id = %id, error = %e, "stacked record unavailable");
                        json!({ "error": e.to_string() })
                    }
                },
                (entry, _) => entry,
            };
            batch.insert(id, record);
        }
        Ok(batch)
    }

    fn require_driver(&self) -> Result<&Arc<dyn HttpDriver>> {
        self.http_driver
            .as_ref()
            .ok_or_else(|| DebugBarError::Config("no HTTP driver configured".into()))
    }

    fn require_session(&self) -> Result<&Arc<dyn HttpDriver>> {
        let driver = self.require_driver()?;
        if !driver.is_session_started() {
            return Err(DebugBarError::Session("no session started".into()));
        }
        Ok(driver)
    }
}
