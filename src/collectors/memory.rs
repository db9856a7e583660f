use serde_json::{json, Map, Value};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::format::format_bytes;
use super::{Collector, CollectorError, Renderable};

/// Resident memory of this process in bytes, or 0 when the OS won't say.
pub fn current_memory_usage() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    process_memory(pid)
}

fn process_memory(pid: Pid) -> u64 {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    sys.process(pid).map(|p| p.memory()).unwrap_or(0)
}

/// Reports the process memory footprint at collection time.
#[derive(Debug, Default)]
pub struct MemoryCollector;

impl MemoryCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&self) -> Result<Value, CollectorError> {
        let usage = current_memory_usage();
        Ok(json!({
            "usage": usage,
            "usage_str": format_bytes(usage as i64),
        }))
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Renderable for MemoryCollector {
    fn widgets(&self) -> Map<String, Value> {
        let mut widgets = Map::new();
        widgets.insert(
            "memory".into(),
            json!({
                "icon": "cogs",
                "tooltip": "Memory Usage",
                "map": "memory.usage_str",
                "default": "'0B'",
            }),
        );
        widgets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_usage_fields() {
        let value = MemoryCollector::new().collect().unwrap();
        assert!(value["usage"].is_u64());
        assert!(value["usage_str"].as_str().unwrap().ends_with('B'));
    }
}
