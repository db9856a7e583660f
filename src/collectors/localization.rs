use serde_json::{json, Map, Value};

use super::{Collector, CollectorError, Renderable};

/// Current locale and translation domain.
///
/// The locale comes from `LC_ALL`, then `LC_MESSAGES`, then `LANG`, the
/// same precedence the C library applies.
#[derive(Debug, Clone)]
pub struct LocalizationCollector {
    domain: String,
}

impl Default for LocalizationCollector {
    fn default() -> Self {
        Self::new("messages")
    }
}

impl LocalizationCollector {
    pub fn new(domain: impl Into<String>) -> Self {
        Self { domain: domain.into() }
    }

    pub fn locale(&self) -> String {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.is_empty())
            .unwrap_or_else(|| "C".into())
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Collector for LocalizationCollector {
    fn name(&self) -> &str {
        "localization"
    }

    fn collect(&self) -> Result<Value, CollectorError> {
        Ok(json!({
            "locale": self.locale(),
            "domain": self.domain,
        }))
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Renderable for LocalizationCollector {
    fn widgets(&self) -> Map<String, Value> {
        let mut widgets = Map::new();
        widgets.insert(
            "domain".into(),
            json!({ "icon": "bookmark", "map": "localization.domain" }),
        );
        widgets.insert(
            "locale".into(),
            json!({ "icon": "flag", "map": "localization.locale" }),
        );
        widgets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_locale_and_domain() {
        let collector = LocalizationCollector::new("shop");
        let value = collector.collect().unwrap();
        assert_eq!(value["domain"], "shop");
        assert!(!value["locale"].as_str().unwrap().is_empty());
    }

    #[test]
    fn exposes_widgets() {
        let collector = LocalizationCollector::default();
        let widgets = collector.as_renderable().unwrap().widgets();
        assert_eq!(widgets["locale"]["map"], "localization.locale");
        assert_eq!(widgets["domain"]["map"], "localization.domain");
    }
}
