use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::format::format_duration;
use super::{Collector, CollectorError, Renderable};

/// Wall-clock seconds since the Unix epoch, microsecond precision.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// One finished measure, relative to the request start.
#[derive(Debug, Clone, Serialize)]
pub struct Measure {
    pub label: String,
    pub start: f64,
    pub relative_start: f64,
    pub end: f64,
    pub relative_end: f64,
    pub duration: f64,
    pub duration_str: String,
}

/// Request timeline: overall duration plus named measures.
pub struct TimeCollector {
    request_start: f64,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    started: HashMap<String, (String, f64)>,
    measures: Vec<Measure>,
}

impl TimeCollector {
    pub fn new() -> Self {
        Self::starting_at(unix_now())
    }

    pub fn starting_at(request_start: f64) -> Self {
        Self {
            request_start,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn request_start(&self) -> f64 {
        self.request_start
    }

    /// Opens a measure; `label` defaults to `name`.
    pub fn start_measure(&self, name: &str, label: Option<&str>) {
        let label = label.unwrap_or(name).to_owned();
        self.inner
            .lock()
            .started
            .insert(name.to_owned(), (label, unix_now()));
    }

    pub fn has_started_measure(&self, name: &str) -> bool {
        self.inner.lock().started.contains_key(name)
    }

    /// Closes a measure. Returns false when `name` was never started.
    pub fn stop_measure(&self, name: &str) -> bool {
        let end = unix_now();
        let started = self.inner.lock().started.remove(name);
        match started {
            Some((label, start)) => {
                self.add_measure(label, start, end);
                true
            }
            None => {
                tracing::debug!(measure = name, "stop_measure on a measure that was never started");
                false
            }
        }
    }

    pub fn add_measure(&self, label: impl Into<String>, start: f64, end: f64) {
        let duration = end - start;
        self.inner.lock().measures.push(Measure {
            label: label.into(),
            start,
            relative_start: start - self.request_start,
            end,
            relative_end: end - self.request_start,
            duration,
            duration_str: format_duration(duration),
        });
    }

    pub fn measures(&self) -> Vec<Measure> {
        self.inner.lock().measures.clone()
    }
}

impl Default for TimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for TimeCollector {
    fn name(&self) -> &str {
        "time"
    }

    fn collect(&self) -> Result<Value, CollectorError> {
        let end = unix_now();
        let inner = self.inner.lock();

        // Measures still open are reported as ending now but stay open
        let mut open: Vec<&(String, f64)> = inner.started.values().collect();
        open.sort_by(|a, b| a.1.total_cmp(&b.1));
        let measures: Vec<Measure> = inner
            .measures
            .iter()
            .cloned()
            .chain(open.into_iter().map(|(label, start)| Measure {
                label: label.clone(),
                start: *start,
                relative_start: start - self.request_start,
                end,
                relative_end: end - self.request_start,
                duration: end - start,
                duration_str: format_duration(end - start),
            }))
            .collect();

        let duration = end - self.request_start;
        Ok(json!({
            "start": self.request_start,
            "end": end,
            "duration": duration,
            "duration_str": format_duration(duration),
            "measures": serde_json::to_value(&measures)?,
        }))
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Renderable for TimeCollector {
    fn widgets(&self) -> Map<String, Value> {
        let mut widgets = Map::new();
        widgets.insert(
            "time".into(),
            json!({
                "icon": "clock-o",
                "tooltip": "Request Duration",
                "map": "time.duration_str",
                "default": "'0ms'",
            }),
        );
        widgets.insert(
            "timeline".into(),
            json!({
                "icon": "tasks",
                "widget": "TimelineWidget",
                "map": "time",
                "default": "{}",
            }),
        );
        widgets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_are_relative_to_request_start() {
        let collector = TimeCollector::starting_at(100.0);
        collector.add_measure("boot", 100.5, 101.0);

        let measures = collector.measures();
        assert_eq!(measures.len(), 1);
        assert_eq!(measures[0].relative_start, 0.5);
        assert_eq!(measures[0].relative_end, 1.0);
        assert_eq!(measures[0].duration, 0.5);
    }

    #[test]
    fn stop_without_start_is_ignored() {
        let collector = TimeCollector::new();
        assert!(!collector.stop_measure("nope"));
        assert!(collector.measures().is_empty());
    }

    #[test]
    fn open_measures_are_reported_without_closing() {
        let collector = TimeCollector::new();
        collector.start_measure("handler", Some("GET /"));

        let first = collector.collect().unwrap();
        let measures = first["measures"].as_array().unwrap();
        assert_eq!(measures.len(), 1);
        assert_eq!(measures[0]["label"], "GET /");
        assert!(first["duration"].as_f64().unwrap() >= 0.0);

        assert!(collector.has_started_measure("handler"));
        let second = collector.collect().unwrap();
        assert_eq!(second["measures"].as_array().unwrap().len(), 1);
        assert!(collector.measures().is_empty());

        assert!(collector.stop_measure("handler"));
        assert_eq!(collector.measures().len(), 1);
    }
}
