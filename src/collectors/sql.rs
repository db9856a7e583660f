use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use super::format::{format_bytes, format_duration};
use super::summary::DurationSummary;
use super::{Collector, CollectorError, Renderable};
use crate::config::SqlConfig;
use crate::sql::{ParamKey, ParamValue, TracedStatement};

/// Folds finished statements into one report per collection pass.
///
/// Query-issuing code owns a [`TracedStatement`] while it executes, then
/// hands it over with [`add_statement`](Self::add_statement).
pub struct SqlCollector {
    inner: Mutex<Vec<TracedStatement>>,
    quotation_char: String,
    render_with_params: bool,
}

impl SqlCollector {
    pub fn new() -> Self {
        Self::from_config(&SqlConfig::default())
    }

    pub fn from_config(config: &SqlConfig) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            quotation_char: config.quotation_char.clone(),
            render_with_params: config.render_with_params,
        }
    }

    pub fn set_render_with_params(&mut self, enabled: bool, quotation_char: impl Into<String>) {
        self.render_with_params = enabled;
        self.quotation_char = quotation_char.into();
    }

    /// Creates a statement that is already started.
    pub fn begin<K, V>(
        &self,
        sql: impl Into<String>,
        parameters: impl IntoIterator<Item = (K, V)>,
    ) -> TracedStatement
    where
        K: Into<ParamKey>,
        V: Into<ParamValue>,
    {
        let mut stmt = TracedStatement::new(sql, parameters);
        stmt.start(None, None);
        stmt
    }

    pub fn add_statement(&self, stmt: TracedStatement) {
        self.inner.lock().push(stmt);
    }

    pub fn statement_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Forget collected statements.
    pub fn reset(&self) {
        self.inner.lock().clear();
    }
}

impl Default for SqlCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for SqlCollector {
    fn name(&self) -> &str {
        "sql"
    }

    fn collect(&self) -> Result<Value, CollectorError> {
        let statements = self.inner.lock();
        let quotation = self.render_with_params.then_some(self.quotation_char.as_str());

        let accumulated_duration: f64 = statements.iter().filter_map(|s| s.duration()).sum();
        let memory_usage: i64 = statements.iter().filter_map(|s| s.memory_delta()).sum();
        let failed = statements.iter().filter(|s| !s.is_success()).count();
        let summary = DurationSummary::from_seconds(statements.iter().filter_map(|s| s.duration()));

        Ok(json!({
            "nb_statements": statements.len(),
            "nb_failed_statements": failed,
            "accumulated_duration": accumulated_duration,
            "accumulated_duration_str": format_duration(accumulated_duration),
            "memory_usage": memory_usage,
            "memory_usage_str": format_bytes(memory_usage),
            "statements": statements.iter().map(|s| s.to_json(quotation)).collect::<Vec<_>>(),
            "duration_summary": serde_json::to_value(summary)?,
        }))
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Renderable for SqlCollector {
    fn widgets(&self) -> Map<String, Value> {
        let mut widgets = Map::new();
        widgets.insert(
            "database".into(),
            json!({
                "icon": "database",
                "widget": "SQLQueriesWidget",
                "map": "sql",
                "default": "[]",
            }),
        );
        widgets.insert(
            "database:badge".into(),
            json!({ "map": "sql.nb_statements", "default": 0 }),
        );
        widgets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ErrorInfo;

    fn finished(sql: &str, params: Vec<(ParamKey, ParamValue)>, secs: f64, error: Option<ErrorInfo>) -> TracedStatement {
        let mut stmt = TracedStatement::new(sql, params);
        stmt.start(Some(10.0), Some(100));
        stmt.end(error, 1, Some(10.0 + secs), Some(164)).unwrap();
        stmt
    }

    #[test]
    fn empty_report() {
        let value = SqlCollector::new().collect().unwrap();
        assert_eq!(value["nb_statements"], 0);
        assert_eq!(value["statements"], json!([]));
        assert_eq!(value["duration_summary"]["count"], 0);
    }

    #[test]
    fn aggregates_statements() {
        let collector = SqlCollector::new();
        collector.add_statement(finished("SELECT 1", vec![], 0.25, None));
        collector.add_statement(finished(
            "SELECT * FROM t WHERE id = ?",
            vec![(ParamKey::Index(0), 7i64.into())],
            0.5,
            Some(ErrorInfo::new("HY000", "gone")),
        ));

        let value = collector.collect().unwrap();
        assert_eq!(value["nb_statements"], 2);
        assert_eq!(value["nb_failed_statements"], 1);
        assert_eq!(value["accumulated_duration"], 0.75);
        assert_eq!(value["memory_usage"], 128);
        assert_eq!(value["memory_usage_str"], "128B");
        assert_eq!(value["statements"][1]["sql"], "SELECT * FROM t WHERE id = ?");
        assert_eq!(value["duration_summary"]["count"], 2);
    }

    #[test]
    fn renders_params_when_enabled() {
        let mut collector = SqlCollector::new();
        collector.set_render_with_params(true, "'");
        collector.add_statement(finished(
            "SELECT * FROM t WHERE name = :name",
            vec![(ParamKey::from("name"), "bob".into())],
            0.01,
            None,
        ));

        let value = collector.collect().unwrap();
        assert_eq!(value["statements"][0]["sql"], "SELECT * FROM t WHERE name = 'bob'");
    }

    #[test]
    fn begin_returns_started_statement() {
        let collector = SqlCollector::new();
        let mut stmt = collector.begin("DELETE FROM t", Vec::<(usize, ParamValue)>::new());
        assert!(stmt.start_time().is_some());
        stmt.end(None, 4, None, None).unwrap();
        collector.add_statement(stmt);
        assert_eq!(collector.statement_count(), 1);

        collector.reset();
        assert_eq!(collector.statement_count(), 0);
    }
}
