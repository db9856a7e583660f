use serde::Serialize;
use serde_json::{json, Map, Value};

use super::render::render_sql;
use super::{ParamKey, ParamValue};
use crate::collectors::format::{format_bytes, format_duration};
use crate::collectors::memory::current_memory_usage;
use crate::collectors::time::unix_now;
use crate::error::{DebugBarError, Result};

/// Driver error attached to a failed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Created,
    Started,
    Ended,
}

/// Lifecycle and measurements of one executed statement.
///
/// `duration` and `memory_delta` stay `None` until [`end`](Self::end).
/// Once ended the record is frozen: later `start`/`end` calls are ignored.
#[derive(Debug, Clone)]
pub struct TracedStatement {
    sql: String,
    parameters: Vec<(ParamKey, String)>,
    prepared_id: Option<String>,
    state: StatementState,
    start_time: Option<f64>,
    end_time: Option<f64>,
    duration: Option<f64>,
    start_memory: Option<u64>,
    end_memory: Option<u64>,
    memory_delta: Option<i64>,
    row_count: u64,
    error: Option<ErrorInfo>,
}

impl TracedStatement {
    pub fn new<K, V>(sql: impl Into<String>, parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<ParamKey>,
        V: Into<ParamValue>,
    {
        Self {
            sql: sql.into(),
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into().into_display_text()))
                .collect(),
            prepared_id: None,
            state: StatementState::Created,
            start_time: None,
            end_time: None,
            duration: None,
            start_memory: None,
            end_memory: None,
            memory_delta: None,
            row_count: 0,
            error: None,
        }
    }

    pub fn with_prepared_id(mut self, id: impl Into<String>) -> Self {
        self.prepared_id = Some(id.into());
        self
    }

    /// Records start time/memory, defaulting to now and current usage.
    /// Calling it twice overwrites the first values.
    pub fn start(&mut self, start_time: Option<f64>, start_memory: Option<u64>) {
        if self.state == StatementState::Ended {
            tracing::debug!(sql = %self.sql, "start() on an ended statement ignored");
            return;
        }
        self.start_time = Some(start_time.unwrap_or_else(unix_now));
        self.start_memory = Some(start_memory.unwrap_or_else(current_memory_usage));
        self.state = StatementState::Started;
    }

    /// Computes duration and memory delta and freezes the record.
    ///
    /// # Errors
    /// `StatementNotStarted` when `start` was never called.
    pub fn end(
        &mut self,
        error: Option<ErrorInfo>,
        row_count: u64,
        end_time: Option<f64>,
        end_memory: Option<u64>,
    ) -> Result<()> {
        let (start_time, start_memory) = match (self.state, self.start_time, self.start_memory) {
            (StatementState::Ended, ..) => {
                tracing::debug!(sql = %self.sql, "end() on an ended statement ignored");
                return Ok(());
            }
            (StatementState::Started, Some(t), Some(m)) => (t, m),
            _ => return Err(DebugBarError::StatementNotStarted),
        };

        let end_time = end_time.unwrap_or_else(unix_now);
        let end_memory = end_memory.unwrap_or_else(current_memory_usage);

        self.end_time = Some(end_time);
        self.duration = Some(end_time - start_time);
        self.end_memory = Some(end_memory);
        self.memory_delta = Some(end_memory as i64 - start_memory as i64);
        self.row_count = row_count;
        self.error = error;
        self.state = StatementState::Ended;
        Ok(())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The statement with parameters inlined, for display only.
    pub fn sql_with_params(&self, quotation_char: &str) -> String {
        render_sql(&self.sql, &self.parameters, quotation_char)
    }

    /// Sanitized parameters; always valid text.
    pub fn parameters(&self) -> &[(ParamKey, String)] {
        &self.parameters
    }

    pub fn prepared_id(&self) -> Option<&str> {
        self.prepared_id.as_deref()
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared_id.is_some()
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn start_memory(&self) -> Option<u64> {
        self.start_memory
    }

    pub fn end_memory(&self) -> Option<u64> {
        self.end_memory
    }

    pub fn memory_delta(&self) -> Option<i64> {
        self.memory_delta
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn error_code(&self) -> &str {
        self.error.as_ref().map_or("0", |e| e.code.as_str())
    }

    pub fn error_message(&self) -> &str {
        self.error.as_ref().map_or("", |e| e.message.as_str())
    }

    /// JSON form reported by the SQL collector. With `quotation_char` the
    /// `sql` field carries the rendered statement instead of the raw one.
    pub fn to_json(&self, quotation_char: Option<&str>) -> Value {
        let sql = match quotation_char {
            Some(q) => self.sql_with_params(q),
            None => self.sql.clone(),
        };
        let params: Map<String, Value> = self
            .parameters
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect();

        json!({
            "sql": sql,
            "row_count": self.row_count,
            "stmt_id": self.prepared_id,
            "prepared_stmt": self.is_prepared(),
            "params": params,
            "duration": self.duration,
            "duration_str": self.duration.map(format_duration),
            "memory": self.memory_delta,
            "memory_str": self.memory_delta.map(format_bytes),
            "end_memory": self.end_memory,
            "is_success": self.is_success(),
            "error_code": self.error_code(),
            "error_message": self.error_message(),
        })
    }
}
